use solana_client::client_error::ClientError;
use solana_sdk::{
    program_error::ProgramError, pubkey::ParsePubkeyError, signature::ParseSignatureError,
    signer::SignerError,
};
use thiserror::Error;

use crate::client::api_error::RelayApiError;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// Errors surfaced by the fee relayer client.
///
/// Every variant maps to a stable `(code, message)` pair via [`Error::code`]
/// and the `Display` implementation, so presentation layers can translate
/// without inspecting causes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown error")]
    Unknown,
    #[error("wrong address")]
    WrongAddress,
    #[error("swap pools not found")]
    SwapPoolsNotFound,
    #[error("transit token mint not found")]
    TransitTokenMintNotFound,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unsupported swap")]
    UnsupportedSwap,
    #[error("relay info missing")]
    RelayInfoMissing,
    #[error("invalid fee payer")]
    InvalidFeePayer,
    #[error("no token for paying fee is provided")]
    FeePayingTokenMissing,
    #[error("unauthorized")]
    Unauthorized,
    /// The top-up transaction landed on-chain but the relayed transaction
    /// failed afterwards. The reserved fee is not lost; retries must skip
    /// the top-up step.
    #[error("topping up succeeded, but the relayed transaction failed")]
    TopUpSuccessButTransactionThrows { logs: Vec<String> },
    #[error("inconsistent relay context")]
    InconsistentRelayContext,
    #[error("missing recent blockhash")]
    MissingBlockhash,
    #[error("missing relay fee payer")]
    MissingRelayFeePayer,
    #[error("operation cancelled")]
    Cancelled,
    #[error("fee relayer api error: {0}")]
    Api(#[from] RelayApiError),
    #[error("rpc client error: {0}")]
    RpcClient(#[from] ClientError),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid pubkey: {0}")]
    PubkeyParse(#[from] ParsePubkeyError),
    #[error("invalid transaction signature: {0}")]
    SignatureParse(#[from] ParseSignatureError),
    #[error("signing error: {0}")]
    Signer(#[from] SignerError),
    #[error("token program error: {0}")]
    TokenProgram(#[from] ProgramError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable numeric identity, matching the production wire contract.
    /// Transport and serialization failures share the unknown code; relay
    /// server errors carry the server-assigned code.
    pub fn code(&self) -> i64 {
        match self {
            Self::Unknown => -1,
            Self::WrongAddress => -2,
            Self::SwapPoolsNotFound => -3,
            Self::TransitTokenMintNotFound => -4,
            Self::InvalidAmount => -5,
            Self::InvalidSignature => -6,
            Self::UnsupportedSwap => -7,
            Self::RelayInfoMissing => -8,
            Self::InvalidFeePayer => -9,
            Self::FeePayingTokenMissing => -10,
            Self::Unauthorized => -11,
            Self::TopUpSuccessButTransactionThrows { .. } => -12,
            Self::InconsistentRelayContext => -14,
            Self::MissingBlockhash => -15,
            Self::MissingRelayFeePayer => -16,
            Self::Cancelled => -17,
            Self::Api(err) => err.code,
            Self::RpcClient(_)
            | Self::Http(_)
            | Self::PubkeyParse(_)
            | Self::SignatureParse(_)
            | Self::Signer(_)
            | Self::TokenProgram(_)
            | Self::Json(_) => -1,
        }
    }
}
