use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    message::Message,
    pubkey::Pubkey,
    signature::Signature,
    system_instruction,
};
use tracing::warn;
use url::Url;

use crate::Result;

const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONFIRMATION_POLL_ATTEMPTS: usize = 30;

/// Narrow view of the Solana RPC surface consumed by the relay core.
///
/// "Account not found" is a normal `Ok(None)` result, never an error.
#[automock]
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    async fn get_account_info(&self, address: Pubkey) -> Result<Option<Account>>;
    async fn get_balance(&self, address: Pubkey) -> Result<u64>;
    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;
    async fn get_lamports_per_signature(&self) -> Result<u64>;
    async fn get_recent_blockhash(&self) -> Result<Hash>;
    async fn wait_for_confirmation(&self, signature: String) -> Result<()>;
}

pub struct SolanaRpcClient(RpcClient);

impl SolanaRpcClient {
    pub fn new(rpc_url: Url) -> Self {
        Self(RpcClient::new_with_commitment(
            rpc_url.into(),
            CommitmentConfig::confirmed(),
        ))
    }

    pub fn client(&self) -> &RpcClient {
        &self.0
    }
}

#[async_trait]
impl SolanaRpc for SolanaRpcClient {
    async fn get_account_info(&self, address: Pubkey) -> Result<Option<Account>> {
        let response = self
            .0
            .get_account_with_commitment(&address, self.0.commitment())
            .await?;
        Ok(response.value)
    }

    async fn get_balance(&self, address: Pubkey) -> Result<u64> {
        Ok(self.0.get_balance(&address).await?)
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        Ok(self.0.get_minimum_balance_for_rent_exemption(data_len).await?)
    }

    async fn get_lamports_per_signature(&self) -> Result<u64> {
        let blockhash = self.0.get_latest_blockhash().await?;
        let probe = Pubkey::new_unique();
        let message = Message::new_with_blockhash(
            &[system_instruction::transfer(&probe, &probe, 0)],
            Some(&probe),
            &blockhash,
        );
        Ok(self.0.get_fee_for_message(&message).await?)
    }

    async fn get_recent_blockhash(&self) -> Result<Hash> {
        Ok(self.0.get_latest_blockhash().await?)
    }

    /// Poll until the signature confirms. A confirmation timeout is logged
    /// and ignored; the relay server has already accepted the transaction
    /// and the caller only needs ordering between submissions.
    async fn wait_for_confirmation(&self, signature: String) -> Result<()> {
        let signature: Signature = signature.parse()?;

        for _ in 0..CONFIRMATION_POLL_ATTEMPTS {
            if self.0.confirm_transaction(&signature).await? {
                return Ok(());
            }
            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }

        warn!(%signature, "transaction did not confirm in time, continuing");
        Ok(())
    }
}
