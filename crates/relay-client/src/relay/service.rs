//! End-to-end relay orchestration: context refresh, top-up, submission.

use std::fmt;
use std::sync::Arc;

use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::api::{
    FeeRelayerApi, RelayTransactionParam, RequestType, StatsInfo, SwapTransactionSignatures,
    TopUpWithSwapParams,
};
use crate::client::orca::{PoolsPair, SwapRouting};
use crate::client::solana::SolanaRpc;
use crate::client::AccountStorage;
use crate::models::{
    FeeAmount, FeeRelayerConfiguration, OperationType, PreparedTransaction, TokenAccount,
};
use crate::program::RelayNetwork;
use crate::relay::context::{RelayContext, RelayContextManager};
use crate::relay::destination::{DestinationAnalyzer, RpcDestinationAnalyzer};
use crate::relay::fee_calculator::{DefaultRelayFeeCalculator, RelayFeeCalculator};
use crate::relay::swap_builder::SwapTransactionBuilder;
use crate::relay::swap_fee::SwapFeeCalculator;
use crate::relay::top_up_builder::TopUpTransactionBuilder;
use crate::relay::transit::RpcTransitTokenAccountManager;
use crate::{Error, Result};

/// Lifecycle of a relayed operation, surfaced through logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Building,
    TopUpRequired,
    ToppingUp,
    Relaying,
    Confirmed,
    Failed,
}

impl fmt::Display for RelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Building => "BUILDING",
            Self::TopUpRequired => "TOP_UP_REQUIRED",
            Self::ToppingUp => "TOPPING_UP",
            Self::Relaying => "RELAYING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
        };
        f.write_str(stage)
    }
}

pub struct RelayService {
    context_manager: Arc<RelayContextManager>,
    solana: Arc<dyn SolanaRpc>,
    routes: Arc<dyn SwapRouting>,
    api: Arc<dyn FeeRelayerApi>,
    account_storage: Arc<dyn AccountStorage>,
    fee_calculator: Box<dyn RelayFeeCalculator>,
    network: RelayNetwork,
    shutdown: CancellationToken,
}

impl RelayService {
    pub fn new(
        context_manager: Arc<RelayContextManager>,
        solana: Arc<dyn SolanaRpc>,
        routes: Arc<dyn SwapRouting>,
        api: Arc<dyn FeeRelayerApi>,
        account_storage: Arc<dyn AccountStorage>,
        network: RelayNetwork,
    ) -> Self {
        Self {
            context_manager,
            solana,
            routes,
            api,
            account_storage,
            fee_calculator: Box::new(DefaultRelayFeeCalculator),
            network,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_fee_calculator(mut self, fee_calculator: Box<dyn RelayFeeCalculator>) -> Self {
        self.fee_calculator = fee_calculator;
        self
    }

    pub fn fee_calculator(&self) -> &dyn RelayFeeCalculator {
        self.fee_calculator.as_ref()
    }

    /// Token that cancels in-flight iterative relay work.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn account(&self) -> Result<Arc<Keypair>> {
        self.account_storage.account().ok_or(Error::Unauthorized)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn destination_analyzer(&self) -> Arc<dyn DestinationAnalyzer> {
        Arc::new(RpcDestinationAnalyzer::new(self.solana.clone()))
    }

    fn transit_manager(&self, owner: Pubkey) -> Arc<RpcTransitTokenAccountManager> {
        Arc::new(RpcTransitTokenAccountManager::new(
            self.solana.clone(),
            owner,
            self.network,
        ))
    }

    /// Relay a prepared transaction without topping up.
    pub async fn relay_transaction(
        &self,
        prepared: &PreparedTransaction,
        config: &FeeRelayerConfiguration,
    ) -> Result<String> {
        let params = RelayTransactionParam::new(
            prepared,
            StatsInfo::new(config.operation_type, config.currency.clone()),
        )?;
        self.api
            .send_transaction(RequestType::RelayTransaction(params))
            .await
    }

    /// Fetch the fee payer's signature for a prepared transaction without
    /// topping up.
    pub async fn sign_relay_transaction(
        &self,
        prepared: &PreparedTransaction,
        config: &FeeRelayerConfiguration,
    ) -> Result<String> {
        let params = RelayTransactionParam::new(
            prepared,
            StatsInfo::new(config.operation_type, config.currency.clone()),
        )?;
        self.api
            .send_transaction(RequestType::SignRelayTransaction(params))
            .await
    }

    /// Top up when needed, then relay the transactions in order.
    pub async fn top_up_if_needed_and_relay_transactions(
        &self,
        transactions: Vec<PreparedTransaction>,
        fee: Option<TokenAccount>,
        config: FeeRelayerConfiguration,
    ) -> Result<Vec<String>> {
        self.top_up_if_needed_and_process(transactions, false, fee, config)
            .await
    }

    /// Top up when needed, then collect fee-payer signatures only.
    pub async fn top_up_if_needed_and_sign_relay_transactions(
        &self,
        transactions: Vec<PreparedTransaction>,
        fee: Option<TokenAccount>,
        config: FeeRelayerConfiguration,
    ) -> Result<Vec<String>> {
        self.top_up_if_needed_and_process(transactions, true, fee, config)
            .await
    }

    async fn top_up_if_needed_and_process(
        &self,
        transactions: Vec<PreparedTransaction>,
        sign_only: bool,
        fee: Option<TokenAccount>,
        config: FeeRelayerConfiguration,
    ) -> Result<Vec<String>> {
        self.context_manager.update().await?;
        let mut context = self
            .context_manager
            .current_context()
            .await
            .ok_or(Error::RelayInfoMissing)?;

        let expected_fee = transactions
            .iter()
            .fold(FeeAmount::ZERO, |total, transaction| {
                total.saturating_add(transaction.expected_fee)
            });

        let top_up_result = self.top_up_if_needed(expected_fee, fee.as_ref()).await?;
        let topped_up = top_up_result.is_some();

        if topped_up {
            // the top-up consumed one quota slot and two signatures
            context.usage_status.current_usage += 1;
            context.usage_status.amount_used += context.lamports_per_signature * 2;
            self.context_manager.replace_context(context.clone()).await;
        }

        match self
            .process_transactions(&transactions, sign_only, &config, &mut context)
            .await
        {
            Ok(signatures) => {
                info!(stage = %RelayStage::Confirmed, count = signatures.len(), "relay finished");
                Ok(signatures)
            }
            Err(err) if topped_up => {
                // the fee reservation landed on-chain; retries must not
                // top up again
                error!(stage = %RelayStage::Failed, ?err, "relay failed after successful top-up");
                Err(Error::TopUpSuccessButTransactionThrows {
                    logs: extract_program_logs(&err),
                })
            }
            Err(err) => {
                error!(stage = %RelayStage::Failed, ?err, "relay failed");
                Err(err)
            }
        }
    }

    async fn process_transactions(
        &self,
        transactions: &[PreparedTransaction],
        sign_only: bool,
        config: &FeeRelayerConfiguration,
        context: &mut RelayContext,
    ) -> Result<Vec<String>> {
        let mut signatures = Vec::with_capacity(transactions.len());

        for (index, prepared) in transactions.iter().enumerate() {
            self.check_cancelled()?;

            let params = RelayTransactionParam::new(
                prepared,
                StatsInfo::new(config.operation_type, config.currency.clone()),
            )?;
            let request = if sign_only {
                RequestType::SignRelayTransaction(params)
            } else {
                RequestType::RelayTransaction(params)
            };

            info!(stage = %RelayStage::Relaying, index, "submitting transaction to relay");
            let signature = self.api.send_transaction(request).await?;
            signatures.push(signature.clone());

            // advance the quota only after the server confirmed usage
            context.usage_status.current_usage += 1;
            context.usage_status.amount_used += prepared.expected_fee.transaction;
            self.context_manager.replace_context(context.clone()).await;

            if !sign_only && index < transactions.len() - 1 {
                self.check_cancelled()?;
                self.solana.wait_for_confirmation(signature).await?;
            }
        }

        Ok(signatures)
    }

    /// Top up the relay account when the fee cannot be covered as-is.
    ///
    /// Returns `None` when no top-up was necessary, otherwise the top-up
    /// transaction signatures.
    pub async fn top_up_if_needed(
        &self,
        expected_fee: FeeAmount,
        paying_fee_token: Option<&TokenAccount>,
    ) -> Result<Option<Vec<String>>> {
        let context = self
            .context_manager
            .current_context()
            .await
            .ok_or(Error::RelayInfoMissing)?;

        // paying in native SOL transfers directly to the fee payer
        if paying_fee_token.map(|token| token.mint) == Some(spl_token::native_mint::id()) {
            return Ok(None);
        }

        let top_up_amount = self
            .fee_calculator
            .calculate_needed_top_up_amount(
                &context,
                expected_fee,
                paying_fee_token.map(|token| token.mint),
            )
            .await?;

        if top_up_amount.total() == 0 {
            return Ok(None);
        }

        let paying_fee_token = paying_fee_token.ok_or(Error::FeePayingTokenMissing)?;

        info!(
            stage = %RelayStage::TopUpRequired,
            amount = top_up_amount.total(),
            "relay account must be topped up"
        );

        let top_up_pools = self
            .get_pools_pair_for_top_up(top_up_amount.total(), paying_fee_token)
            .await?;

        self.top_up(paying_fee_token, top_up_amount.total(), &top_up_pools)
            .await
            .map(Some)
    }

    /// Route selection for a top-up swap: a direct pool when one exists,
    /// otherwise the best transitive route.
    async fn get_pools_pair_for_top_up(
        &self,
        top_up_amount: u64,
        paying_fee_token: &TokenAccount,
    ) -> Result<PoolsPair> {
        let tradable_pairs = self
            .routes
            .get_tradable_pools_pairs(paying_fee_token.mint, spl_token::native_mint::id())
            .await?;

        if let Some(direct) = tradable_pairs.iter().find(|pair| pair.len() == 1) {
            return Ok(direct.clone());
        }

        self.routes
            .find_best_pools_pair_for_estimated_amount(top_up_amount, &tradable_pairs)?
            .ok_or(Error::SwapPoolsNotFound)
    }

    async fn top_up(
        &self,
        source_token: &TokenAccount,
        target_amount: u64,
        top_up_pools: &PoolsPair,
    ) -> Result<Vec<String>> {
        let context = self
            .context_manager
            .current_context()
            .await
            .ok_or(Error::RelayInfoMissing)?;
        let owner = self.account()?;

        self.check_cancelled()?;
        let blockhash = self.solana.get_recent_blockhash().await?;

        let builder = TopUpTransactionBuilder::new(
            self.routes.clone(),
            self.transit_manager(owner.pubkey()),
            owner.clone(),
            self.network,
        );
        let (swap_data, prepared) = builder
            .build_top_up_transaction(&context, source_token, top_up_pools, target_amount, blockhash)
            .await?;

        let params = TopUpWithSwapParams {
            user_source_token_account: source_token.address.to_string(),
            source_token_mint: source_token.mint.to_string(),
            user_authority: owner.pubkey().to_string(),
            top_up_swap: swap_data,
            fee_amount: prepared.expected_fee.total(),
            signatures: SwapTransactionSignatures {
                user_authority_signature: prepared.owner_signature()?,
                transfer_authority_signature: None,
            },
            blockhash: blockhash.to_string(),
            stats_info: StatsInfo::new(
                OperationType::TopUp,
                Some(source_token.mint.to_string()),
            ),
        };

        info!(stage = %RelayStage::ToppingUp, target_amount, "submitting top-up");
        let signature = self
            .api
            .send_transaction(RequestType::RelayTopUpWithSwap(params))
            .await?;

        Ok(vec![signature])
    }

    /// Explicit top-up against a caller-held context snapshot.
    pub async fn top_up_with_context(
        &self,
        amount: FeeAmount,
        paying_fee_token: Option<&TokenAccount>,
        relay_context: RelayContext,
    ) -> Result<Option<Vec<String>>> {
        if self.context_manager.current_context().await.as_ref() != Some(&relay_context) {
            return Err(Error::InconsistentRelayContext);
        }

        let Some(result) = self.top_up_if_needed(amount, paying_fee_token).await? else {
            return Ok(None);
        };

        let mut context = relay_context;
        context.usage_status.current_usage += 1;
        context.usage_status.amount_used += context.lamports_per_signature * 2;
        self.context_manager.replace_context(context).await;

        Ok(Some(result))
    }

    /// Build the relayed swap transaction set: classify destination and
    /// transit accounts, compute the exact network fee, top up when
    /// needed, and assemble the transactions with the relay fee payer
    /// substituted.
    #[allow(clippy::too_many_arguments)]
    pub async fn prepare_swap_transactions(
        &self,
        source_token: &TokenAccount,
        destination_token_mint: Pubkey,
        destination_address: Option<Pubkey>,
        fee_token: Option<TokenAccount>,
        pools: &PoolsPair,
        input_amount: u64,
        slippage: f64,
    ) -> Result<(Vec<PreparedTransaction>, u64)> {
        let context = match self.context_manager.current_context().await {
            Some(context) => context,
            None => self.context_manager.update().await?,
        };
        let owner = self.account()?;
        let destination_analyzer = self.destination_analyzer();

        info!(
            stage = %RelayStage::Building,
            source = %source_token.mint,
            destination = %destination_token_mint,
            hops = pools.len(),
            "building relayed swap"
        );

        let swap_fee_calculator =
            SwapFeeCalculator::new(destination_analyzer.clone(), self.account_storage.clone());
        let expected_fee = swap_fee_calculator
            .calculate_swapping_network_fees(
                context.lamports_per_signature,
                context.minimum_token_account_balance,
                pools.len(),
                &source_token.mint,
                &destination_token_mint,
                destination_address,
            )
            .await?;

        self.top_up_if_needed(expected_fee, fee_token.as_ref())
            .await?;

        self.check_cancelled()?;
        let blockhash = self.solana.get_recent_blockhash().await?;

        let builder = SwapTransactionBuilder::new(
            destination_analyzer,
            self.transit_manager(owner.pubkey()),
            self.routes.clone(),
            self.network,
        );
        builder
            .build_swap_transaction(
                &context,
                owner.as_ref(),
                source_token,
                destination_token_mint,
                destination_address,
                pools,
                input_amount,
                slippage,
                blockhash,
            )
            .await
    }
}

fn extract_program_logs(err: &Error) -> Vec<String> {
    match err {
        Error::Api(api_error) => api_error
            .client_error()
            .map(|client_error| client_error.program_logs)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
