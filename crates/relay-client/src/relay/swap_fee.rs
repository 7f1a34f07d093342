//! Network-fee computation for relayed swaps.
//!
//! The signature counts and rent charges below are an exact mirror of the
//! relay server's fee schedule. An off-by-one signature here produces
//! transactions the server underfunds or rejects.

use std::sync::Arc;

use solana_sdk::{pubkey::Pubkey, signer::Signer};

use crate::client::AccountStorage;
use crate::models::FeeAmount;
use crate::relay::destination::{DestinationAnalysis, DestinationAnalyzer};
use crate::{Error, Result};

pub struct SwapFeeCalculator {
    destination_analyzer: Arc<dyn DestinationAnalyzer>,
    account_storage: Arc<dyn AccountStorage>,
}

impl SwapFeeCalculator {
    pub fn new(
        destination_analyzer: Arc<dyn DestinationAnalyzer>,
        account_storage: Arc<dyn AccountStorage>,
    ) -> Self {
        Self {
            destination_analyzer,
            account_storage,
        }
    }

    /// Exact network fee of a relayed swap.
    ///
    /// Base cost is the fee payer's and the owner's signatures. A native
    /// SOL source adds the temporary wSOL account's signature. A native
    /// SOL destination adds the temporary destination account's signature
    /// and never charges rent (the wrapped-SOL deposit is covered by the
    /// relay account's own funding). Creating the destination account
    /// charges exactly one rent exemption; on a two-hop route whose
    /// source is native SOL it also forces a second transaction and with
    /// it a second fee-payer/owner signature pair.
    ///
    /// `destination_address` is the already-resolved account to check, if
    /// known. It never bypasses destination analysis.
    pub async fn calculate_swapping_network_fees(
        &self,
        lamports_per_signature: u64,
        minimum_token_account_balance: u64,
        swap_pools_count: usize,
        source_token_mint: &Pubkey,
        destination_token_mint: &Pubkey,
        destination_address: Option<Pubkey>,
    ) -> Result<FeeAmount> {
        if swap_pools_count == 0 || swap_pools_count > 2 {
            return Err(Error::SwapPoolsNotFound);
        }

        tracing::debug!(
            %source_token_mint,
            %destination_token_mint,
            ?destination_address,
            swap_pools_count,
            "calculating swapping network fees"
        );

        let owner = self
            .account_storage
            .account()
            .ok_or(Error::Unauthorized)?
            .pubkey();

        let destination = self
            .destination_analyzer
            .analyze_destination(owner, *destination_token_mint)
            .await?;

        let source_is_native_sol = *source_token_mint == spl_token::native_mint::id();

        // fee payer + owner
        let mut signatures: u64 = 2;
        if source_is_native_sol {
            signatures += 1;
        }

        let mut account_balances = 0;
        match destination {
            DestinationAnalysis::WsolAccount => {
                signatures += 1;
            }
            DestinationAnalysis::SplAccount { needs_creation } => {
                if needs_creation {
                    account_balances += minimum_token_account_balance;
                    if swap_pools_count == 2 && source_is_native_sol {
                        // account creation splits the transitive swap into
                        // a second transaction with its own signature pair
                        signatures += 2;
                    }
                }
            }
        }

        Ok(FeeAmount::new(
            signatures * lamports_per_signature,
            account_balances,
        ))
    }
}
