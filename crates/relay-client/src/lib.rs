//! Client library for the gasless Solana fee relay protocol.
//!
//! A relay server pays network fees on the user's behalf and is
//! reimbursed in the token being transferred or swapped. This crate
//! computes the exact lamport cost of relayed operations, classifies the
//! token accounts involved, assembles the top-up and relayed
//! transactions, and drives submission through the relay HTTP API.

pub mod client;
mod error;
pub mod models;
pub mod program;
pub mod relay;

pub use error::{Error, Result};

pub use client::api::{FeeRelayerApi, HttpFeeRelayerApi};
pub use client::orca::{Pool, PoolsPair, SwapRouting};
pub use client::solana::{SolanaRpc, SolanaRpcClient};
pub use client::AccountStorage;
pub use models::{
    FeeAmount, FeeRelayerConfiguration, OperationType, PreparedTransaction, RelayAccountStatus,
    TokenAccount, UsageStatus,
};
pub use program::RelayNetwork;
pub use relay::context::{RelayContext, RelayContextManager};
pub use relay::destination::{DestinationAnalysis, DestinationAnalyzer, RpcDestinationAnalyzer};
pub use relay::fee_calculator::{DefaultRelayFeeCalculator, RelayFeeCalculator};
pub use relay::service::{RelayService, RelayStage};
pub use relay::swap_fee::SwapFeeCalculator;
pub use relay::transit::{RpcTransitTokenAccountManager, TransitTokenAccountManager};
