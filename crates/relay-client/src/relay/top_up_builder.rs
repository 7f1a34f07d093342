//! Assembles the transaction that funds the user's relay account before a
//! relayed operation.

use std::sync::Arc;

use solana_sdk::{
    hash::Hash, instruction::Instruction, signature::Keypair, signer::Signer,
    system_instruction, transaction::Transaction,
};
use spl_associated_token_account::get_associated_token_address;

use crate::client::api::SwapData;
use crate::client::orca::{PoolsPair, SwapRouting};
use crate::models::{FeeAmount, PreparedTransaction, RelayAccountStatus, TokenAccount};
use crate::program::{self, RelayNetwork};
use crate::relay::context::RelayContext;
use crate::relay::fee_calculator::TOP_UP_SLIPPAGE;
use crate::relay::swap_data::prepare_swap_data;
use crate::relay::transit::TransitTokenAccountManager;
use crate::{Error, Result};

pub struct TopUpTransactionBuilder {
    routes: Arc<dyn SwapRouting>,
    transit_manager: Arc<dyn TransitTokenAccountManager>,
    account: Arc<Keypair>,
    network: RelayNetwork,
}

impl TopUpTransactionBuilder {
    pub fn new(
        routes: Arc<dyn SwapRouting>,
        transit_manager: Arc<dyn TransitTokenAccountManager>,
        account: Arc<Keypair>,
        network: RelayNetwork,
    ) -> Self {
        Self {
            routes,
            transit_manager,
            account,
            network,
        }
    }

    /// Build the top-up transaction: optional relay-account creation, the
    /// top-up swap through the relay program, and the fee payback
    /// transfer. Returns the swap description for the relay request
    /// alongside the signed transaction.
    pub async fn build_top_up_transaction(
        &self,
        context: &RelayContext,
        source_token: &TokenAccount,
        top_up_pools: &PoolsPair,
        target_amount: u64,
        blockhash: Hash,
    ) -> Result<(SwapData, PreparedTransaction)> {
        let owner = self.account.pubkey();
        let fee_payer = context.fee_payer_address;

        // the source must be the user's account, not the fee payer's
        let fee_payer_associated_account =
            get_associated_token_address(&fee_payer, &source_token.mint);
        if source_token.address == fee_payer_associated_account {
            return Err(Error::WrongAddress);
        }

        let mut transaction_fee = 0;
        let mut account_balances_fee = 0;

        let top_up_network_fee = 2 * context.lamports_per_signature;
        if !context
            .usage_status
            .is_free_transaction_fee_available(top_up_network_fee)
        {
            transaction_fee += top_up_network_fee;
        }

        let mut instructions: Vec<Instruction> = Vec::new();

        if context.relay_account_status == RelayAccountStatus::NotYetCreated {
            instructions.push(system_instruction::transfer(
                &fee_payer,
                &program::user_relay_address(&owner, self.network),
                context.minimum_relay_account_balance,
            ));
            account_balances_fee += context.minimum_relay_account_balance;
        }

        let transit_token = self.transit_manager.get_transit_token(top_up_pools)?;
        let needs_create_transit = self
            .transit_manager
            .needs_create_transit_token_account(transit_token)
            .await?;

        let (swap_data, _) = prepare_swap_data(
            self.routes.as_ref(),
            &owner,
            top_up_pools,
            None,
            Some(target_amount),
            TOP_UP_SLIPPAGE,
            transit_token.map(|token| token.mint),
            needs_create_transit == Some(true),
            false,
        )?;

        match &swap_data {
            SwapData::Direct(_) => {
                // the relay program funds the temporary wSOL account
                account_balances_fee += context.minimum_token_account_balance;
            }
            SwapData::Transitive(_) => {
                if needs_create_transit == Some(true) {
                    let transit_token = transit_token.ok_or(Error::TransitTokenMintNotFound)?;
                    instructions.push(program::create_transit_token_account_instruction(
                        &fee_payer,
                        &owner,
                        &transit_token.address,
                        &transit_token.mint,
                        self.network,
                    ));
                }
                account_balances_fee += context.minimum_token_account_balance;
            }
        }

        instructions.push(program::top_up_swap_instruction(
            self.network,
            &swap_data,
            &owner,
            &source_token.address,
            &fee_payer,
        )?);

        let expected_fee = FeeAmount::new(transaction_fee, account_balances_fee);

        // repay the fronted fee from the freshly topped-up relay account
        instructions.push(program::transfer_sol_instruction(
            &owner,
            &fee_payer,
            expected_fee.total(),
            self.network,
        ));

        let mut transaction = Transaction::new_with_payer(&instructions, Some(&fee_payer));
        transaction.try_partial_sign(&[self.account.as_ref()], blockhash)?;

        let prepared = PreparedTransaction::new(
            transaction,
            vec![self.account.insecure_clone()],
            expected_fee,
        );

        Ok((swap_data, prepared))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::pubkey::Pubkey;

    use crate::client::orca::tests::pool;
    use crate::client::orca::MockSwapRouting;
    use crate::models::UsageStatus;
    use crate::relay::transit::MockTransitTokenAccountManager;

    const MINIMUM_TOKEN_ACCOUNT_BALANCE: u64 = 2_039_280;
    const MINIMUM_RELAY_ACCOUNT_BALANCE: u64 = 890_880;
    const LAMPORTS_PER_SIGNATURE: u64 = 5000;

    fn context(
        relay_account_status: RelayAccountStatus,
        free_transactions: bool,
    ) -> RelayContext {
        RelayContext {
            minimum_token_account_balance: MINIMUM_TOKEN_ACCOUNT_BALANCE,
            minimum_relay_account_balance: MINIMUM_RELAY_ACCOUNT_BALANCE,
            fee_payer_address: "FG4Y3yX4AAchp1HvNZ7LfzFTewF2f6nDoMDCohTFrdpT"
                .parse()
                .unwrap(),
            lamports_per_signature: LAMPORTS_PER_SIGNATURE,
            relay_account_status,
            usage_status: UsageStatus {
                max_usage: if free_transactions { 100 } else { 0 },
                current_usage: 0,
                max_amount: 10_000_000,
                amount_used: 0,
                reached_limit_link_creation: false,
            },
        }
    }

    fn direct_route() -> PoolsPair {
        vec![pool(Pubkey::new_unique(), spl_token::native_mint::id())]
    }

    fn builder(
        routes: MockSwapRouting,
        transit_manager: MockTransitTokenAccountManager,
        account: &Arc<Keypair>,
    ) -> TopUpTransactionBuilder {
        TopUpTransactionBuilder::new(
            Arc::new(routes),
            Arc::new(transit_manager),
            account.clone(),
            RelayNetwork::MainnetBeta,
        )
    }

    fn direct_route_mocks(amount_in: u64) -> (MockSwapRouting, MockTransitTokenAccountManager) {
        let mut routes = MockSwapRouting::new();
        routes
            .expect_pool_input_amount()
            .returning(move |_, _, _| Ok(Some(amount_in)));

        let mut transit_manager = MockTransitTokenAccountManager::new();
        transit_manager
            .expect_get_transit_token()
            .returning(|_| Ok(None));
        transit_manager
            .expect_needs_create_transit_token_account()
            .returning(|_| Ok(None));

        (routes, transit_manager)
    }

    #[tokio::test]
    async fn test_direct_top_up_with_free_transaction_and_no_relay_account() {
        let account = Arc::new(Keypair::new());
        let source = TokenAccount::new(Pubkey::new_unique(), Pubkey::new_unique());
        let target_amount = MINIMUM_TOKEN_ACCOUNT_BALANCE + MINIMUM_RELAY_ACCOUNT_BALANCE;

        let (routes, transit_manager) = direct_route_mocks(70_250);
        let builder = builder(routes, transit_manager, &account);

        let (swap_data, prepared) = builder
            .build_top_up_transaction(
                &context(RelayAccountStatus::NotYetCreated, true),
                &source,
                &direct_route(),
                target_amount,
                Hash::new_unique(),
            )
            .await
            .unwrap();

        let SwapData::Direct(direct) = swap_data else {
            panic!("expected a direct top-up swap");
        };
        assert_eq!(direct.amount_in, 70_250);
        assert_eq!(direct.minimum_amount_out, target_amount);
        assert_eq!(
            direct.transfer_authority_pubkey,
            account.pubkey().to_string()
        );

        // create relay account, top-up swap, fee payback
        let message = &prepared.transaction.message;
        assert_eq!(message.instructions.len(), 3);

        // transaction fee is free; rent for the relay account and the
        // temporary wSOL account is charged
        assert_eq!(
            prepared.expected_fee,
            FeeAmount::new(
                0,
                MINIMUM_RELAY_ACCOUNT_BALANCE + MINIMUM_TOKEN_ACCOUNT_BALANCE
            )
        );

        // the payback instruction repays exactly the expected fee
        let payback = message.instructions.last().unwrap();
        assert_eq!(payback.data[0], 2);
        assert_eq!(payback.data[1..], prepared.expected_fee.total().to_le_bytes());

        // the owner has signed
        assert!(prepared.owner_signature().is_ok());
    }

    #[tokio::test]
    async fn test_direct_top_up_without_free_transactions_charges_signatures() {
        let account = Arc::new(Keypair::new());
        let source = TokenAccount::new(Pubkey::new_unique(), Pubkey::new_unique());

        let (routes, transit_manager) = direct_route_mocks(70_250);
        let builder = builder(routes, transit_manager, &account);

        let (_, prepared) = builder
            .build_top_up_transaction(
                &context(
                    RelayAccountStatus::Created {
                        balance: MINIMUM_RELAY_ACCOUNT_BALANCE,
                    },
                    false,
                ),
                &source,
                &direct_route(),
                2_039_280,
                Hash::new_unique(),
            )
            .await
            .unwrap();

        // no relay-account creation: top-up swap + payback only
        assert_eq!(prepared.transaction.message.instructions.len(), 2);
        assert_eq!(
            prepared.expected_fee,
            FeeAmount::new(2 * LAMPORTS_PER_SIGNATURE, MINIMUM_TOKEN_ACCOUNT_BALANCE)
        );
    }

    #[tokio::test]
    async fn test_transitive_top_up_creates_transit_account_when_needed() {
        let account = Arc::new(Keypair::new());
        let source_mint = Pubkey::new_unique();
        let transit_mint = Pubkey::new_unique();
        let source = TokenAccount::new(Pubkey::new_unique(), source_mint);
        let route = vec![
            pool(source_mint, transit_mint),
            pool(transit_mint, spl_token::native_mint::id()),
        ];

        let transit_account = TokenAccount::new(
            program::transit_token_account_address(
                &account.pubkey(),
                &transit_mint,
                RelayNetwork::MainnetBeta,
            ),
            transit_mint,
        );

        let mut routes = MockSwapRouting::new();
        routes
            .expect_pool_input_amount()
            .returning(|_, amount, _| Ok(Some(amount * 2)));

        let mut transit_manager = MockTransitTokenAccountManager::new();
        transit_manager
            .expect_get_transit_token()
            .returning(move |_| Ok(Some(transit_account)));
        transit_manager
            .expect_needs_create_transit_token_account()
            .returning(|_| Ok(Some(true)));

        let builder = builder(routes, transit_manager, &account);

        let (swap_data, prepared) = builder
            .build_top_up_transaction(
                &context(
                    RelayAccountStatus::Created {
                        balance: MINIMUM_RELAY_ACCOUNT_BALANCE,
                    },
                    true,
                ),
                &source,
                &route,
                2_039_280,
                Hash::new_unique(),
            )
            .await
            .unwrap();

        let SwapData::Transitive(transitive) = swap_data else {
            panic!("expected a transitive top-up swap");
        };
        assert!(transitive.needs_create_transit_token_account);
        assert_eq!(
            transitive.transit_token_mint_pubkey,
            transit_mint.to_string()
        );

        // create transit account, top-up swap, fee payback
        assert_eq!(prepared.transaction.message.instructions.len(), 3);
        assert_eq!(
            prepared.expected_fee,
            FeeAmount::new(0, MINIMUM_TOKEN_ACCOUNT_BALANCE)
        );
    }

    #[tokio::test]
    async fn test_fee_payer_owned_source_is_rejected() {
        let account = Arc::new(Keypair::new());
        let fee_payer: Pubkey = "FG4Y3yX4AAchp1HvNZ7LfzFTewF2f6nDoMDCohTFrdpT"
            .parse()
            .unwrap();
        let mint = Pubkey::new_unique();
        let source = TokenAccount::new(get_associated_token_address(&fee_payer, &mint), mint);

        let builder = builder(
            MockSwapRouting::new(),
            MockTransitTokenAccountManager::new(),
            &account,
        );

        let err = builder
            .build_top_up_transaction(
                &context(RelayAccountStatus::NotYetCreated, true),
                &source,
                &direct_route(),
                1000,
                Hash::new_unique(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WrongAddress));
    }
}
