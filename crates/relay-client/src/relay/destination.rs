use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::client::solana::SolanaRpc;
use crate::Result;

/// Classification of a destination token account before a transfer or
/// swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationAnalysis {
    /// Ordinary SPL account; `needs_creation` is true when the associated
    /// account does not exist yet.
    SplAccount { needs_creation: bool },
    /// Wrapped native SOL. Always handled through a fresh temporary
    /// account, so on-chain existence is irrelevant.
    WsolAccount,
}

#[automock]
#[async_trait]
pub trait DestinationAnalyzer: Send + Sync {
    async fn analyze_destination(
        &self,
        owner: Pubkey,
        mint: Pubkey,
    ) -> Result<DestinationAnalysis>;
}

pub struct RpcDestinationAnalyzer {
    solana: Arc<dyn SolanaRpc>,
}

impl RpcDestinationAnalyzer {
    pub fn new(solana: Arc<dyn SolanaRpc>) -> Self {
        Self { solana }
    }
}

#[async_trait]
impl DestinationAnalyzer for RpcDestinationAnalyzer {
    async fn analyze_destination(
        &self,
        owner: Pubkey,
        mint: Pubkey,
    ) -> Result<DestinationAnalysis> {
        if mint == spl_token::native_mint::id() {
            return Ok(DestinationAnalysis::WsolAccount);
        }

        let associated_address = get_associated_token_address(&owner, &mint);
        let account = self.solana.get_account_info(associated_address).await?;
        let populated = account.is_some_and(|account| !account.data.is_empty());

        Ok(DestinationAnalysis::SplAccount {
            needs_creation: !populated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{account::Account, program_pack::Pack};

    use crate::client::solana::MockSolanaRpc;

    fn token_account_data() -> Account {
        Account {
            lamports: 2_039_280,
            data: vec![0; spl_token::state::Account::LEN],
            owner: spl_token::id(),
            executable: false,
            rent_epoch: 0,
        }
    }

    #[tokio::test]
    async fn test_wrapped_native_mint_is_always_wsol() {
        // no RPC expectation: the mint alone decides
        let analyzer = RpcDestinationAnalyzer::new(Arc::new(MockSolanaRpc::new()));

        let result = analyzer
            .analyze_destination(Pubkey::new_unique(), spl_token::native_mint::id())
            .await
            .unwrap();

        assert_eq!(result, DestinationAnalysis::WsolAccount);
    }

    #[tokio::test]
    async fn test_existing_spl_account_needs_no_creation() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let expected_address = get_associated_token_address(&owner, &mint);

        let mut solana = MockSolanaRpc::new();
        solana
            .expect_get_account_info()
            .withf(move |address| *address == expected_address)
            .times(1)
            .returning(|_| Ok(Some(token_account_data())));

        let analyzer = RpcDestinationAnalyzer::new(Arc::new(solana));
        let result = analyzer.analyze_destination(owner, mint).await.unwrap();

        assert_eq!(
            result,
            DestinationAnalysis::SplAccount {
                needs_creation: false
            }
        );
    }

    #[tokio::test]
    async fn test_absent_spl_account_needs_creation() {
        let mut solana = MockSolanaRpc::new();
        solana
            .expect_get_account_info()
            .times(1)
            .returning(|_| Ok(None));

        let analyzer = RpcDestinationAnalyzer::new(Arc::new(solana));
        let result = analyzer
            .analyze_destination(Pubkey::new_unique(), Pubkey::new_unique())
            .await
            .unwrap();

        assert_eq!(
            result,
            DestinationAnalysis::SplAccount {
                needs_creation: true
            }
        );
    }

    #[tokio::test]
    async fn test_empty_spl_account_needs_creation() {
        let mut solana = MockSolanaRpc::new();
        solana.expect_get_account_info().times(1).returning(|_| {
            Ok(Some(Account {
                data: vec![],
                ..token_account_data()
            }))
        });

        let analyzer = RpcDestinationAnalyzer::new(Arc::new(solana));
        let result = analyzer
            .analyze_destination(Pubkey::new_unique(), Pubkey::new_unique())
            .await
            .unwrap();

        assert_eq!(
            result,
            DestinationAnalysis::SplAccount {
                needs_creation: true
            }
        );
    }
}
