//! Top-up amount calculation against the cached relay context.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::client::orca::SwapRouting;
use crate::models::FeeAmount;
use crate::relay::context::RelayContext;
use crate::{Error, Result};

/// Smallest top-up the relay server accepts.
pub const MINIMUM_TOP_UP_AMOUNT: u64 = 10_000;

/// Fixed slippage applied when swapping the paying token into SOL for a
/// top-up.
pub const TOP_UP_SLIPPAGE: f64 = 0.01;

#[async_trait]
pub trait RelayFeeCalculator: Send + Sync {
    /// Amount the user must add to the relay account so it can act as fee
    /// payer for a transaction costing `expected_fee`.
    async fn calculate_needed_top_up_amount(
        &self,
        context: &RelayContext,
        expected_fee: FeeAmount,
        paying_token_mint: Option<Pubkey>,
    ) -> Result<FeeAmount>;

    /// Convert a SOL-denominated fee into the paying token via the swap
    /// routes.
    async fn calculate_fee_in_paying_token(
        &self,
        routes: &dyn SwapRouting,
        fee_in_sol: FeeAmount,
        paying_fee_token_mint: Pubkey,
    ) -> Result<Option<FeeAmount>>;
}

#[derive(Debug, Default)]
pub struct DefaultRelayFeeCalculator;

#[async_trait]
impl RelayFeeCalculator for DefaultRelayFeeCalculator {
    async fn calculate_needed_top_up_amount(
        &self,
        context: &RelayContext,
        expected_fee: FeeAmount,
        paying_token_mint: Option<Pubkey>,
    ) -> Result<FeeAmount> {
        let mut amount = calculate_min_top_up_amount(context, expected_fee, paying_token_mint);

        // the relay server rejects dust top-ups
        if amount.total() > 0 && amount.total() < MINIMUM_TOP_UP_AMOUNT {
            amount.transaction += MINIMUM_TOP_UP_AMOUNT - amount.total();
        }

        Ok(amount)
    }

    async fn calculate_fee_in_paying_token(
        &self,
        routes: &dyn SwapRouting,
        fee_in_sol: FeeAmount,
        paying_fee_token_mint: Pubkey,
    ) -> Result<Option<FeeAmount>> {
        if paying_fee_token_mint == spl_token::native_mint::id() {
            return Ok(Some(fee_in_sol));
        }

        let tradable_pairs = routes
            .get_tradable_pools_pairs(paying_fee_token_mint, spl_token::native_mint::id())
            .await?;

        let top_up_pools = routes
            .find_best_pools_pair_for_estimated_amount(fee_in_sol.total(), &tradable_pairs)?
            .ok_or(Error::SwapPoolsNotFound)?;

        let transaction_fee =
            routes.pair_input_amount(&top_up_pools, fee_in_sol.transaction, TOP_UP_SLIPPAGE)?;
        let account_creation_fee =
            routes.pair_input_amount(&top_up_pools, fee_in_sol.account_balances, TOP_UP_SLIPPAGE)?;

        Ok(Some(FeeAmount::new(
            transaction_fee.unwrap_or(0),
            account_creation_fee.unwrap_or(0),
        )))
    }
}

fn calculate_min_top_up_amount(
    context: &RelayContext,
    expected_fee: FeeAmount,
    paying_token_mint: Option<Pubkey>,
) -> FeeAmount {
    let mut needed_amount = expected_fee;

    // a top-up transaction itself costs the fee payer's and the owner's
    // signatures
    let expected_top_up_network_fee = 2 * context.lamports_per_signature;
    let expected_transaction_network_fee = expected_fee.transaction;

    let mut needed_top_up_network_fee = expected_top_up_network_fee;
    let mut needed_transaction_network_fee = expected_transaction_network_fee;

    if context
        .usage_status
        .is_free_transaction_fee_available(expected_top_up_network_fee)
    {
        needed_top_up_network_fee = 0;
    }

    // quota state after the hypothetical top-up decides whether the
    // transaction itself is still free
    let mut usage_after_top_up = context.usage_status;
    usage_after_top_up.current_usage += 1;
    usage_after_top_up.amount_used += expected_top_up_network_fee;
    if usage_after_top_up.is_free_transaction_fee_available(expected_transaction_network_fee) {
        needed_transaction_network_fee = 0;
    }

    needed_amount.transaction = needed_top_up_network_fee + needed_transaction_network_fee;

    if needed_amount.total() == 0 {
        return needed_amount;
    }

    let needed_amount_without_checking_relay_account = needed_amount;
    let minimum_relay_account_balance = context.minimum_relay_account_balance;

    match context.relay_account_status.balance() {
        Some(mut relay_account_balance) => {
            if relay_account_balance < minimum_relay_account_balance {
                needed_amount.account_balances +=
                    minimum_relay_account_balance - relay_account_balance;
            } else {
                // everything above the rent-exempt minimum can offset fees
                relay_account_balance -= minimum_relay_account_balance;

                if relay_account_balance >= needed_amount.transaction {
                    relay_account_balance -= needed_amount.transaction;
                    needed_amount.transaction = 0;

                    if relay_account_balance >= needed_amount.account_balances {
                        needed_amount.account_balances = 0;
                    } else {
                        needed_amount.account_balances -= relay_account_balance;
                    }
                } else {
                    needed_amount.transaction -= relay_account_balance;
                }
            }
        }
        None => {
            needed_amount.account_balances += minimum_relay_account_balance;
        }
    }

    // when paying in native SOL the compensation happens without the relay
    // account, so its funding must not be charged
    if needed_amount.total() > 0 && paying_token_mint == Some(spl_token::native_mint::id()) {
        return needed_amount_without_checking_relay_account;
    }

    needed_amount
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::{RelayAccountStatus, UsageStatus};

    const MINIMUM_TOKEN_ACCOUNT_BALANCE: u64 = 2_039_280;
    const MINIMUM_RELAY_ACCOUNT_BALANCE: u64 = 890_880;
    const LAMPORTS_PER_SIGNATURE: u64 = 5000;

    fn usdt_mint() -> Pubkey {
        "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"
            .parse()
            .unwrap()
    }

    fn context_with_free_transactions(relay_account_status: RelayAccountStatus) -> RelayContext {
        RelayContext {
            minimum_token_account_balance: MINIMUM_TOKEN_ACCOUNT_BALANCE,
            minimum_relay_account_balance: MINIMUM_RELAY_ACCOUNT_BALANCE,
            fee_payer_address: "FG4Y3yX4AAchp1HvNZ7LfzFTewF2f6nDoMDCohTFrdpT"
                .parse()
                .unwrap(),
            lamports_per_signature: LAMPORTS_PER_SIGNATURE,
            relay_account_status,
            usage_status: UsageStatus {
                max_usage: 10_000_000,
                current_usage: 0,
                max_amount: 10_000_000,
                amount_used: 0,
                reached_limit_link_creation: false,
            },
        }
    }

    #[tokio::test]
    async fn test_totally_free_transaction_needs_no_top_up() {
        let calculator = DefaultRelayFeeCalculator;
        let expected_fee = FeeAmount::new(5000, 0);

        let amount = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::NotYetCreated),
                expected_fee,
                Some(usdt_mint()),
            )
            .await
            .unwrap();

        assert_eq!(amount, FeeAmount::ZERO);
    }

    #[tokio::test]
    async fn test_relay_account_not_yet_created() {
        let calculator = DefaultRelayFeeCalculator;
        let expected_fee = FeeAmount::new(
            2 * LAMPORTS_PER_SIGNATURE,
            MINIMUM_TOKEN_ACCOUNT_BALANCE,
        );

        // paying in SOL: relay account creation is not needed
        let with_sol = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::NotYetCreated),
                expected_fee,
                Some(spl_token::native_mint::id()),
            )
            .await
            .unwrap();
        assert_eq!(
            with_sol,
            FeeAmount::new(0, expected_fee.account_balances)
        );

        // paying in another token: relay account creation is charged
        let with_usdt = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::NotYetCreated),
                expected_fee,
                Some(usdt_mint()),
            )
            .await
            .unwrap();
        assert_eq!(
            with_usdt,
            FeeAmount::new(
                0,
                MINIMUM_RELAY_ACCOUNT_BALANCE + expected_fee.account_balances
            )
        );
    }

    #[tokio::test]
    async fn test_relay_account_partially_funded() {
        let calculator = DefaultRelayFeeCalculator;
        let expected_fee = FeeAmount::new(LAMPORTS_PER_SIGNATURE, MINIMUM_TOKEN_ACCOUNT_BALANCE);

        // below the rent-exempt minimum: the difference must be refilled
        let balance = MINIMUM_RELAY_ACCOUNT_BALANCE / 2;
        let refill = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::Created { balance }),
                expected_fee,
                Some(usdt_mint()),
            )
            .await
            .unwrap();
        assert_eq!(
            refill,
            FeeAmount::new(
                0,
                (MINIMUM_RELAY_ACCOUNT_BALANCE - balance) + expected_fee.account_balances
            )
        );

        // above the minimum: the excess offsets part of the creation fee
        let excess = 39_280;
        let offset = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::Created {
                    balance: MINIMUM_RELAY_ACCOUNT_BALANCE + excess,
                }),
                expected_fee,
                Some(usdt_mint()),
            )
            .await
            .unwrap();
        assert_eq!(
            offset,
            FeeAmount::new(0, expected_fee.account_balances - excess)
        );
    }

    #[tokio::test]
    async fn test_relay_account_fully_funded() {
        let calculator = DefaultRelayFeeCalculator;
        let expected_fee = FeeAmount::new(LAMPORTS_PER_SIGNATURE, MINIMUM_TOKEN_ACCOUNT_BALANCE);

        let amount = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::Created {
                    balance: MINIMUM_RELAY_ACCOUNT_BALANCE + expected_fee.total() + 500,
                }),
                expected_fee,
                Some(usdt_mint()),
            )
            .await
            .unwrap();

        assert_eq!(amount, FeeAmount::ZERO);
    }

    #[tokio::test]
    async fn test_sol_paying_token_bypasses_relay_account_offsets() {
        let calculator = DefaultRelayFeeCalculator;
        let expected_fee = FeeAmount::new(LAMPORTS_PER_SIGNATURE, MINIMUM_TOKEN_ACCOUNT_BALANCE);

        // the relay account could offset part of the fee, but SOL payments
        // do not touch it
        let amount = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::Created {
                    balance: MINIMUM_RELAY_ACCOUNT_BALANCE + 1000,
                }),
                expected_fee,
                Some(spl_token::native_mint::id()),
            )
            .await
            .unwrap();

        assert_eq!(amount, FeeAmount::new(0, expected_fee.account_balances));
    }

    #[tokio::test]
    async fn test_dust_top_up_is_raised_to_the_minimum() {
        let calculator = DefaultRelayFeeCalculator;
        let expected_fee = FeeAmount::new(LAMPORTS_PER_SIGNATURE, MINIMUM_TOKEN_ACCOUNT_BALANCE);

        // the transaction fee is free and the relay account covers all but
        // a sliver of the creation fee
        let uncovered = MINIMUM_TOP_UP_AMOUNT / 2;
        let balance =
            MINIMUM_RELAY_ACCOUNT_BALANCE + expected_fee.account_balances - uncovered;

        let amount = calculator
            .calculate_needed_top_up_amount(
                &context_with_free_transactions(RelayAccountStatus::Created { balance }),
                expected_fee,
                Some(usdt_mint()),
            )
            .await
            .unwrap();

        assert_eq!(amount.total(), MINIMUM_TOP_UP_AMOUNT);
    }

    mod paying_token_conversion {
        use super::*;

        use crate::client::orca::tests::pool;
        use crate::client::orca::MockSwapRouting;

        #[tokio::test]
        async fn test_sol_paying_token_is_identity() {
            let calculator = DefaultRelayFeeCalculator;
            let fee = FeeAmount::new(10_000, 2_039_280);

            let converted = calculator
                .calculate_fee_in_paying_token(
                    &MockSwapRouting::new(),
                    fee,
                    spl_token::native_mint::id(),
                )
                .await
                .unwrap();

            assert_eq!(converted, Some(fee));
        }

        #[tokio::test]
        async fn test_conversion_uses_best_route_quotes() {
            let paying_mint = usdt_mint();
            let route = vec![pool(paying_mint, spl_token::native_mint::id())];
            let fee = FeeAmount::new(10_000, 2_039_280);

            let mut routes = MockSwapRouting::new();
            let selected = route.clone();
            routes
                .expect_get_tradable_pools_pairs()
                .times(1)
                .returning(move |_, _| Ok(vec![route.clone()]));
            routes
                .expect_find_best_pools_pair_for_estimated_amount()
                .times(1)
                .returning(move |_, _| Ok(Some(selected.clone())));
            routes
                .expect_pair_input_amount()
                .withf(move |_, amount, slippage| {
                    (*amount == fee.transaction || *amount == fee.account_balances)
                        && *slippage == TOP_UP_SLIPPAGE
                })
                .times(2)
                .returning(|_, amount, _| Ok(Some(amount * 2)));

            let calculator = DefaultRelayFeeCalculator;
            let converted = calculator
                .calculate_fee_in_paying_token(&routes, fee, paying_mint)
                .await
                .unwrap();

            assert_eq!(converted, Some(FeeAmount::new(20_000, 4_078_560)));
        }

        #[tokio::test]
        async fn test_no_route_is_a_typed_error() {
            let mut routes = MockSwapRouting::new();
            routes
                .expect_get_tradable_pools_pairs()
                .returning(|_, _| Ok(vec![]));
            routes
                .expect_find_best_pools_pair_for_estimated_amount()
                .returning(|_, _| Ok(None));

            let calculator = DefaultRelayFeeCalculator;
            let err = calculator
                .calculate_fee_in_paying_token(
                    &routes,
                    FeeAmount::new(10_000, 0),
                    usdt_mint(),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, Error::SwapPoolsNotFound));
        }
    }
}
