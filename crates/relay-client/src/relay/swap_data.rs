//! Builds the relay server's swap-leg descriptions from a chosen route.

use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};

use crate::client::api::{SwapData, TransitiveSwapData};
use crate::client::orca::{PoolsPair, SwapRouting};
use crate::{Error, Result};

/// Amounts and accounts of every hop of a route, ready for the wire.
///
/// Exactly one of `input_amount` / `minimum_amount_out` may be omitted;
/// the missing side is quoted through the routing collaborator. When
/// `fresh_transfer_authority` is set a throwaway delegate keypair is
/// generated and returned so its signature can accompany the request.
#[allow(clippy::too_many_arguments)]
pub fn prepare_swap_data(
    routes: &dyn SwapRouting,
    owner: &Pubkey,
    pools: &PoolsPair,
    input_amount: Option<u64>,
    minimum_amount_out: Option<u64>,
    slippage: f64,
    transit_token_mint: Option<Pubkey>,
    needs_create_transit_token_account: bool,
    fresh_transfer_authority: bool,
) -> Result<(SwapData, Option<Keypair>)> {
    if pools.is_empty() || pools.len() > 2 {
        return Err(Error::SwapPoolsNotFound);
    }
    if input_amount.is_none() && minimum_amount_out.is_none() {
        return Err(Error::InvalidAmount);
    }

    let transfer_authority = fresh_transfer_authority.then(Keypair::new);
    let authority_pubkey = transfer_authority
        .as_ref()
        .map(|keypair| keypair.pubkey())
        .unwrap_or(*owner);

    if let [pool] = pools.as_slice() {
        let amount_in = match input_amount {
            Some(amount) => amount,
            None => routes
                .pool_input_amount(pool, minimum_amount_out.ok_or(Error::InvalidAmount)?, slippage)?
                .ok_or(Error::InvalidAmount)?,
        };
        let minimum_amount_out = match minimum_amount_out {
            Some(amount) => amount,
            None => routes
                .pool_minimum_amount_out(pool, input_amount.ok_or(Error::InvalidAmount)?, slippage)?
                .ok_or(Error::InvalidAmount)?,
        };

        let swap = pool.direct_swap_data(&authority_pubkey, amount_in, minimum_amount_out);
        return Ok((SwapData::Direct(swap), transfer_authority));
    }

    let (first_pool, second_pool) = (&pools[0], &pools[1]);
    let transit_token_mint = transit_token_mint.ok_or(Error::TransitTokenMintNotFound)?;

    let (first_amount_in, second_amount_in, second_amount_out) = match (input_amount, minimum_amount_out) {
        (Some(input), _) => {
            let mid = routes
                .pool_minimum_amount_out(first_pool, input, slippage)?
                .unwrap_or(0);
            let out = routes
                .pool_minimum_amount_out(second_pool, mid, slippage)?
                .ok_or(Error::InvalidAmount)?;
            (input, mid, out)
        }
        (None, Some(out)) => {
            let mid = routes
                .pool_input_amount(second_pool, out, slippage)?
                .unwrap_or(0);
            let input = routes
                .pool_input_amount(first_pool, mid, slippage)?
                .ok_or(Error::InvalidAmount)?;
            (input, mid, out)
        }
        (None, None) => return Err(Error::InvalidAmount),
    };

    let swap = TransitiveSwapData {
        from: first_pool.direct_swap_data(&authority_pubkey, first_amount_in, second_amount_in),
        to: second_pool.direct_swap_data(&authority_pubkey, second_amount_in, second_amount_out),
        transit_token_mint_pubkey: transit_token_mint.to_string(),
        needs_create_transit_token_account,
    };

    Ok((SwapData::Transitive(swap), transfer_authority))
}
