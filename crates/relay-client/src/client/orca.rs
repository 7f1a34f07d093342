//! Interface to the AMM pool-routing library.
//!
//! The routing library owns pool discovery, pricing curves, and its own
//! swap instruction encoding. This module only fixes the route shape the
//! relay core consumes: ordered pairs of one or two directional pools.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

use crate::client::api::DirectSwapData;
use crate::{Error, Result};

/// A single AMM pool, oriented in the direction of the trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub account: Pubkey,
    pub authority: Pubkey,
    pub source_mint: Pubkey,
    pub destination_mint: Pubkey,
    pub source_token_account: Pubkey,
    pub destination_token_account: Pubkey,
    pub pool_token_mint: Pubkey,
    pub fee_account: Pubkey,
    pub program_id: Pubkey,
}

impl Pool {
    /// Wire-format swap leg for the relay server.
    pub fn direct_swap_data(
        &self,
        transfer_authority: &Pubkey,
        amount_in: u64,
        minimum_amount_out: u64,
    ) -> DirectSwapData {
        DirectSwapData {
            program_id: self.program_id.to_string(),
            account_pubkey: self.account.to_string(),
            authority_pubkey: self.authority.to_string(),
            transfer_authority_pubkey: transfer_authority.to_string(),
            source_pubkey: self.source_token_account.to_string(),
            destination_pubkey: self.destination_token_account.to_string(),
            pool_token_mint_pubkey: self.pool_token_mint.to_string(),
            pool_fee_account_pubkey: self.fee_account.to_string(),
            amount_in,
            minimum_amount_out,
        }
    }
}

/// Ordered route of one (direct) or two (transitive) pools.
pub type PoolsPair = Vec<Pool>;

/// Intermediate mint shared by the two hops of a transitive route.
pub fn transit_token_mint(pools: &PoolsPair) -> Result<Pubkey> {
    let [first, second] = pools.as_slice() else {
        return Err(Error::TransitTokenMintNotFound);
    };
    if first.destination_mint != second.source_mint {
        return Err(Error::TransitTokenMintNotFound);
    }
    Ok(first.destination_mint)
}

/// Pool-routing collaborator. Pricing math stays on the other side of
/// this trait; the relay core only chains single-pool quotes into route
/// quotes.
#[automock]
#[async_trait]
pub trait SwapRouting: Send + Sync {
    /// All tradable routes between two mints, direct routes first.
    async fn get_tradable_pools_pairs(
        &self,
        from_mint: Pubkey,
        to_mint: Pubkey,
    ) -> Result<Vec<PoolsPair>>;

    /// Best route able to produce roughly `estimated_amount` of the
    /// output token.
    fn find_best_pools_pair_for_estimated_amount(
        &self,
        estimated_amount: u64,
        pairs: &[PoolsPair],
    ) -> Result<Option<PoolsPair>>;

    /// Input needed on `pool` to receive at least `minimum_receive_amount`
    /// under `slippage`.
    fn pool_input_amount(
        &self,
        pool: &Pool,
        minimum_receive_amount: u64,
        slippage: f64,
    ) -> Result<Option<u64>>;

    /// Guaranteed output of `pool` for `input_amount` under `slippage`.
    fn pool_minimum_amount_out(
        &self,
        pool: &Pool,
        input_amount: u64,
        slippage: f64,
    ) -> Result<Option<u64>>;

    /// The AMM library's own swap instruction for a direct hop.
    fn swap_instruction(
        &self,
        pool: &Pool,
        user_transfer_authority: Pubkey,
        user_source: Pubkey,
        user_destination: Pubkey,
        amount_in: u64,
        minimum_amount_out: u64,
    ) -> Result<Instruction>;

    /// Route-level input for a required output, chaining hops back to
    /// front.
    fn pair_input_amount(
        &self,
        pools: &PoolsPair,
        minimum_amount_out: u64,
        slippage: f64,
    ) -> Result<Option<u64>> {
        match pools.as_slice() {
            [pool] => self.pool_input_amount(pool, minimum_amount_out, slippage),
            [first, second] => {
                let Some(mid) = self.pool_input_amount(second, minimum_amount_out, slippage)?
                else {
                    return Ok(None);
                };
                self.pool_input_amount(first, mid, slippage)
            }
            _ => Err(Error::SwapPoolsNotFound),
        }
    }

    /// Route-level guaranteed output for an input, chaining hops front to
    /// back.
    fn pair_minimum_amount_out(
        &self,
        pools: &PoolsPair,
        input_amount: u64,
        slippage: f64,
    ) -> Result<Option<u64>> {
        match pools.as_slice() {
            [pool] => self.pool_minimum_amount_out(pool, input_amount, slippage),
            [first, second] => {
                let Some(mid) = self.pool_minimum_amount_out(first, input_amount, slippage)?
                else {
                    return Ok(None);
                };
                self.pool_minimum_amount_out(second, mid, slippage)
            }
            _ => Err(Error::SwapPoolsNotFound),
        }
    }
}
