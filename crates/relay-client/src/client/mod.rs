pub mod api;
pub mod api_error;
pub mod orca;
pub mod solana;

use std::sync::{Arc, RwLock};

use mockall::automock;
use solana_sdk::signature::Keypair;

/// Key storage collaborator. The relay core only ever reads the account.
#[automock]
pub trait AccountStorage: Send + Sync {
    fn account(&self) -> Option<Arc<Keypair>>;
    fn save(&self, account: Keypair);
}

/// Process-local storage for tests and simple integrations.
#[derive(Default)]
pub struct InMemoryAccountStorage {
    account: RwLock<Option<Arc<Keypair>>>,
}

impl InMemoryAccountStorage {
    pub fn new(account: Keypair) -> Self {
        Self {
            account: RwLock::new(Some(Arc::new(account))),
        }
    }
}

impl AccountStorage for InMemoryAccountStorage {
    fn account(&self) -> Option<Arc<Keypair>> {
        self.account.read().expect("account storage lock").clone()
    }

    fn save(&self, account: Keypair) {
        *self.account.write().expect("account storage lock") = Some(Arc::new(account));
    }
}
