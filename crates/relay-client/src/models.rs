use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};

use crate::{Error, Result};

/// Fee breakdown for a single relayed operation, in lamports.
///
/// `transaction` covers signatures, `account_balances` covers rent for
/// accounts that must be created. Arithmetic always produces new values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAmount {
    pub transaction: u64,
    pub account_balances: u64,
}

impl FeeAmount {
    pub const ZERO: Self = Self {
        transaction: 0,
        account_balances: 0,
    };

    pub fn new(transaction: u64, account_balances: u64) -> Self {
        Self {
            transaction,
            account_balances,
        }
    }

    pub fn total(&self) -> u64 {
        self.transaction + self.account_balances
    }

    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            transaction: self.transaction.saturating_add(other.transaction),
            account_balances: self.account_balances.saturating_add(other.account_balances),
        }
    }
}

/// On-chain state of the user's relay account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayAccountStatus {
    NotYetCreated,
    Created { balance: u64 },
}

impl RelayAccountStatus {
    pub fn balance(&self) -> Option<u64> {
        match self {
            Self::NotYetCreated => None,
            Self::Created { balance } => Some(*balance),
        }
    }
}

/// Free-tier quota granted by the relay server.
///
/// Only ever replaced from server-confirmed usage, never advanced
/// speculatively ahead of a confirmed top-up or relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatus {
    pub max_usage: i32,
    pub current_usage: i32,
    pub max_amount: u64,
    pub amount_used: u64,
    pub reached_limit_link_creation: bool,
}

impl UsageStatus {
    pub fn is_free_transaction_fee_available(&self, transaction_fee: u64) -> bool {
        self.current_usage < self.max_usage
            && self.amount_used.saturating_add(transaction_fee) <= self.max_amount
    }
}

/// An SPL token account paired with its mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub address: Pubkey,
    pub mint: Pubkey,
}

impl TokenAccount {
    pub fn new(address: Pubkey, mint: Pubkey) -> Self {
        Self { address, mint }
    }
}

/// A fully assembled transaction awaiting relay submission.
///
/// The relay fee payer is the transaction fee payer; `signers` holds only
/// the client-side keypairs (owner, fresh temporary accounts, transfer
/// authority). The fee payer signature is added server side.
#[derive(Debug)]
pub struct PreparedTransaction {
    pub transaction: Transaction,
    pub signers: Vec<Keypair>,
    pub expected_fee: FeeAmount,
}

impl PreparedTransaction {
    pub fn new(transaction: Transaction, signers: Vec<Keypair>, expected_fee: FeeAmount) -> Self {
        Self {
            transaction,
            signers,
            expected_fee,
        }
    }

    /// Base58 signature produced by `signer`, if it has signed this
    /// transaction.
    pub fn find_signature(&self, signer: &Pubkey) -> Result<String> {
        let index = self
            .transaction
            .message
            .account_keys
            .iter()
            .position(|key| key == signer)
            .ok_or(Error::InvalidSignature)?;

        let signature = self
            .transaction
            .signatures
            .get(index)
            .ok_or(Error::InvalidSignature)?;

        if *signature == solana_sdk::signature::Signature::default() {
            return Err(Error::InvalidSignature);
        }

        Ok(signature.to_string())
    }

    /// Signature of the first signer (by convention the user authority).
    pub fn owner_signature(&self) -> Result<String> {
        let owner = self.signers.first().ok_or(Error::InvalidSignature)?;
        self.find_signature(&owner.pubkey())
    }
}

/// Per-operation relay configuration supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct FeeRelayerConfiguration {
    pub operation_type: OperationType,
    pub currency: Option<String>,
    pub additional_payback_fee: u64,
    pub auto_payback: bool,
}

/// Operation tag attached to every relay request for server-side
/// accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    TopUp,
    Transfer,
    Swap,
    #[default]
    Other,
}
