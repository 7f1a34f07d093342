//! Cached snapshot of the on-chain state every fee computation depends
//! on.

use std::sync::Arc;

use solana_sdk::{program_pack::Pack, pubkey::Pubkey};
use tokio::sync::RwLock;
use tracing::info;

use crate::client::api::FeeRelayerApi;
use crate::client::solana::SolanaRpc;
use crate::models::{RelayAccountStatus, UsageStatus};
use crate::program::{self, RelayNetwork};
use crate::Result;

/// Immutable snapshot of relay-relevant on-chain state.
///
/// Consumers receive it by value; a snapshot is never partially updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayContext {
    pub minimum_token_account_balance: u64,
    pub minimum_relay_account_balance: u64,
    pub fee_payer_address: Pubkey,
    pub lamports_per_signature: u64,
    pub relay_account_status: RelayAccountStatus,
    pub usage_status: UsageStatus,
}

/// Owner of the cached [`RelayContext`].
///
/// `update` fans out the underlying fetches concurrently and publishes a
/// complete snapshot in a single swap; a failed update leaves the previous
/// snapshot untouched.
pub struct RelayContextManager {
    solana: Arc<dyn SolanaRpc>,
    api: Arc<dyn FeeRelayerApi>,
    owner: Pubkey,
    network: RelayNetwork,
    context: RwLock<Option<RelayContext>>,
}

impl RelayContextManager {
    pub fn new(
        solana: Arc<dyn SolanaRpc>,
        api: Arc<dyn FeeRelayerApi>,
        owner: Pubkey,
        network: RelayNetwork,
    ) -> Self {
        Self {
            solana,
            api,
            owner,
            network,
            context: RwLock::new(None),
        }
    }

    /// Rebuild the snapshot wholesale from the chain and the relay server.
    pub async fn update(&self) -> Result<RelayContext> {
        let (minimums, lamports_per_signature, fee_payer_address, relay_account_status, usage) =
            tokio::try_join!(
                self.fetch_minimum_balances(),
                self.solana.get_lamports_per_signature(),
                self.fetch_fee_payer(),
                self.fetch_relay_account_status(),
                self.fetch_usage_status(),
            )?;

        let context = RelayContext {
            minimum_token_account_balance: minimums.0,
            minimum_relay_account_balance: minimums.1,
            fee_payer_address,
            lamports_per_signature,
            relay_account_status,
            usage_status: usage,
        };

        *self.context.write().await = Some(context.clone());

        info!(
            fee_payer = %context.fee_payer_address,
            relay_account = ?context.relay_account_status,
            "relay context refreshed"
        );

        Ok(context)
    }

    /// Last good snapshot; `None` before the first successful update.
    pub async fn current_context(&self) -> Option<RelayContext> {
        self.context.read().await.clone()
    }

    /// Replace the cached snapshot, e.g. after server-confirmed usage.
    pub async fn replace_context(&self, context: RelayContext) {
        *self.context.write().await = Some(context);
    }

    async fn fetch_minimum_balances(&self) -> Result<(u64, u64)> {
        let (token_account, relay_account) = tokio::try_join!(
            self.solana
                .get_minimum_balance_for_rent_exemption(spl_token::state::Account::LEN),
            self.solana.get_minimum_balance_for_rent_exemption(0),
        )?;
        Ok((token_account, relay_account))
    }

    async fn fetch_fee_payer(&self) -> Result<Pubkey> {
        let raw = self.api.get_fee_payer_pubkey().await?;
        raw.parse().map_err(|_| crate::Error::InvalidFeePayer)
    }

    async fn fetch_relay_account_status(&self) -> Result<RelayAccountStatus> {
        let relay_address = program::user_relay_address(&self.owner, self.network);
        let status = match self.solana.get_account_info(relay_address).await? {
            Some(account) => RelayAccountStatus::Created {
                balance: account.lamports,
            },
            None => RelayAccountStatus::NotYetCreated,
        };
        Ok(status)
    }

    async fn fetch_usage_status(&self) -> Result<UsageStatus> {
        let response = self
            .api
            .get_free_fee_limits(self.owner.to_string())
            .await?;
        Ok(UsageStatus::from(&response))
    }
}
