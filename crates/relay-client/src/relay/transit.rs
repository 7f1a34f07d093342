use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use solana_sdk::pubkey::Pubkey;

use crate::client::orca::{self, PoolsPair};
use crate::client::solana::SolanaRpc;
use crate::models::TokenAccount;
use crate::program::{self, RelayNetwork};
use crate::Result;

/// Decides whether a route requires an intermediate ("transit") token
/// account and whether that account must be created first.
#[automock]
#[async_trait]
pub trait TransitTokenAccountManager: Send + Sync {
    /// `None` for a direct route; the deterministic transit account for a
    /// two-hop route.
    fn get_transit_token(&self, pools: &PoolsPair) -> Result<Option<TokenAccount>>;

    /// Whether the transit account must be created on-chain; `None` when
    /// no transit token applies.
    async fn needs_create_transit_token_account(
        &self,
        transit_token: Option<TokenAccount>,
    ) -> Result<Option<bool>>;
}

pub struct RpcTransitTokenAccountManager {
    solana: Arc<dyn SolanaRpc>,
    owner: Pubkey,
    network: RelayNetwork,
}

impl RpcTransitTokenAccountManager {
    pub fn new(solana: Arc<dyn SolanaRpc>, owner: Pubkey, network: RelayNetwork) -> Self {
        Self {
            solana,
            owner,
            network,
        }
    }
}

#[async_trait]
impl TransitTokenAccountManager for RpcTransitTokenAccountManager {
    fn get_transit_token(&self, pools: &PoolsPair) -> Result<Option<TokenAccount>> {
        if pools.len() < 2 {
            return Ok(None);
        }

        let mint = orca::transit_token_mint(pools)?;
        let address = program::transit_token_account_address(&self.owner, &mint, self.network);

        Ok(Some(TokenAccount::new(address, mint)))
    }

    async fn needs_create_transit_token_account(
        &self,
        transit_token: Option<TokenAccount>,
    ) -> Result<Option<bool>> {
        let Some(transit_token) = transit_token else {
            return Ok(None);
        };

        let account = self.solana.get_account_info(transit_token.address).await?;
        Ok(Some(account.is_none()))
    }
}
