//! HTTP client for the fee relayer server and the exact wire format of
//! its requests.

use std::collections::HashMap;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::client::api_error::RelayApiError;
use crate::models::{OperationType, PreparedTransaction, UsageStatus};
use crate::{Error, Result};

/// Relay server collaborator.
#[automock]
#[async_trait]
pub trait FeeRelayerApi: Send + Sync {
    /// Public key of the account the server signs transactions with.
    async fn get_fee_payer_pubkey(&self) -> Result<String>;

    /// Free-tier quota for `authority`.
    async fn get_free_fee_limits(&self, authority: String) -> Result<FreeFeeLimitsResponse>;

    /// Submit an operation; returns the transaction signature (confirmed
    /// relay) or the fee payer's signature (sign-only).
    async fn send_transaction(&self, request: RequestType) -> Result<String>;
}

/// One relay server operation and its JSON parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestType {
    RelayTopUpWithSwap(TopUpWithSwapParams),
    RelayTransaction(RelayTransactionParam),
    SignRelayTransaction(RelayTransactionParam),
    TransferSol(TransferSolParams),
    TransferSplToken(TransferSplTokenParams),
}

impl RequestType {
    pub fn path(&self) -> &'static str {
        match self {
            Self::RelayTopUpWithSwap(_) => "/relay_top_up_with_swap",
            Self::RelayTransaction(_) => "/relay_transaction",
            Self::SignRelayTransaction(_) => "/sign_relay_transaction",
            Self::TransferSol(_) => "/transfer_sol",
            Self::TransferSplToken(_) => "/transfer_spl_token",
        }
    }
}

pub struct HttpFeeRelayerApi {
    http: reqwest::Client,
    base_url: Url,
    version: u8,
}

impl HttpFeeRelayerApi {
    pub fn new(base_url: Url, version: u8) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            version,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let mut url = self.base_url.as_str().trim_end_matches('/').to_string();
        if self.version > 1 {
            url.push_str(&format!("/v{}", self.version));
        }
        url.push_str(path);
        url
    }

    async fn decode_or_error(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(decode_api_error(status.as_u16(), body));
        }

        Ok(body)
    }
}

fn decode_api_error(status: u16, body: String) -> Error {
    match serde_json::from_str::<RelayApiError>(&body) {
        Ok(err) => Error::Api(err),
        Err(_) => Error::Api(RelayApiError {
            code: i64::from(status),
            message: body,
            data: None,
        }),
    }
}

/// Some endpoints answer with a JSON string, some with the bare
/// signature text.
fn decode_signature(body: &str) -> String {
    serde_json::from_str::<String>(body).unwrap_or_else(|_| {
        body.trim()
            .trim_matches(|c| c == '[' || c == ']' || c == '"')
            .to_string()
    })
}

#[async_trait]
impl FeeRelayerApi for HttpFeeRelayerApi {
    async fn get_fee_payer_pubkey(&self) -> Result<String> {
        let url = self.endpoint("/fee_payer/pubkey");
        let response = self.http.get(&url).send().await?;
        let body = self.decode_or_error(response).await?;
        Ok(decode_signature(&body))
    }

    async fn get_free_fee_limits(&self, authority: String) -> Result<FreeFeeLimitsResponse> {
        let url = self.endpoint(&format!("/free_fee_limits/{authority}"));
        let response = self.http.get(&url).send().await?;
        let body = self.decode_or_error(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_transaction(&self, request: RequestType) -> Result<String> {
        let path = request.path();
        let url = self.endpoint(path);
        debug!(%url, "sending relay request");

        let response = self.http.post(&url).json(&request).send().await?;
        let body = self.decode_or_error(response).await?;

        if path == "/sign_relay_transaction" {
            #[derive(Deserialize)]
            struct SignResponse {
                signature: String,
            }
            let decoded: SignResponse = serde_json::from_str(&body)?;
            return Ok(decoded.signature);
        }

        Ok(decode_signature(&body))
    }
}

// Wire parameter structs. Field names and renames are the server's JSON
// contract.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsInfo {
    pub operation_type: OperationType,
    pub device_type: String,
    pub currency: Option<String>,
    pub build: Option<String>,
    pub environment: String,
}

impl StatsInfo {
    pub fn new(operation_type: OperationType, currency: Option<String>) -> Self {
        Self {
            operation_type,
            device_type: "Web".to_string(),
            currency,
            build: None,
            environment: "release".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUpWithSwapParams {
    #[serde(rename = "user_source_token_account_pubkey")]
    pub user_source_token_account: String,
    #[serde(rename = "source_token_mint_pubkey")]
    pub source_token_mint: String,
    #[serde(rename = "user_authority_pubkey")]
    pub user_authority: String,
    pub top_up_swap: SwapData,
    pub fee_amount: u64,
    pub signatures: SwapTransactionSignatures,
    pub blockhash: String,
    #[serde(rename = "info")]
    pub stats_info: StatsInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapData {
    #[serde(rename = "Spl")]
    Direct(DirectSwapData),
    #[serde(rename = "SplTransitive")]
    Transitive(TransitiveSwapData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectSwapData {
    pub program_id: String,
    pub account_pubkey: String,
    pub authority_pubkey: String,
    pub transfer_authority_pubkey: String,
    pub source_pubkey: String,
    pub destination_pubkey: String,
    pub pool_token_mint_pubkey: String,
    pub pool_fee_account_pubkey: String,
    pub amount_in: u64,
    pub minimum_amount_out: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitiveSwapData {
    pub from: DirectSwapData,
    pub to: DirectSwapData,
    pub transit_token_mint_pubkey: String,
    pub needs_create_transit_token_account: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTransactionSignatures {
    pub user_authority_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_authority_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayTransactionParam {
    pub instructions: Vec<RequestInstruction>,
    pub signatures: HashMap<String, String>,
    pub pubkeys: Vec<String>,
    pub blockhash: String,
    #[serde(rename = "info")]
    pub stats_info: StatsInfo,
}

impl RelayTransactionParam {
    pub fn new(prepared: &PreparedTransaction, stats_info: StatsInfo) -> Result<Self> {
        let message = &prepared.transaction.message;
        let blockhash = message.recent_blockhash;
        if blockhash == solana_sdk::hash::Hash::default() {
            return Err(Error::MissingBlockhash);
        }

        let pubkeys: Vec<String> = message
            .account_keys
            .iter()
            .map(|key| key.to_string())
            .collect();

        let instructions = message
            .instructions
            .iter()
            .map(|compiled| RequestInstruction {
                program_index: compiled.program_id_index,
                accounts: compiled
                    .accounts
                    .iter()
                    .map(|&index| RequestAccountMeta {
                        pubkey_index: index,
                        is_signer: message.is_signer(index as usize),
                        is_writable: message.is_maybe_writable(index as usize, None),
                    })
                    .collect(),
                data: compiled.data.clone(),
            })
            .collect();

        let mut signatures = HashMap::new();
        for signer in &prepared.signers {
            let pubkey = solana_sdk::signer::Signer::pubkey(signer);
            let index = message
                .account_keys
                .iter()
                .position(|key| *key == pubkey)
                .ok_or(Error::InvalidSignature)?;
            signatures.insert(index.to_string(), prepared.find_signature(&pubkey)?);
        }

        Ok(Self {
            instructions,
            signatures,
            pubkeys,
            blockhash: blockhash.to_string(),
            stats_info,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInstruction {
    #[serde(rename = "program_id")]
    pub program_index: u8,
    pub accounts: Vec<RequestAccountMeta>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAccountMeta {
    #[serde(rename = "pubkey")]
    pub pubkey_index: u8,
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSolParams {
    #[serde(rename = "sender_pubkey")]
    pub sender: String,
    #[serde(rename = "recipient_pubkey")]
    pub recipient: String,
    #[serde(rename = "lamports")]
    pub amount: u64,
    pub signature: String,
    pub blockhash: String,
    #[serde(rename = "info")]
    pub stats_info: StatsInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSplTokenParams {
    #[serde(rename = "sender_token_account_pubkey")]
    pub sender: String,
    #[serde(rename = "recipient_pubkey")]
    pub recipient: String,
    #[serde(rename = "token_mint_pubkey")]
    pub mint: String,
    #[serde(rename = "authority_pubkey")]
    pub authority: String,
    pub amount: u64,
    pub decimals: u8,
    pub signature: String,
    pub blockhash: String,
    #[serde(rename = "info")]
    pub stats_info: StatsInfo,
}

/// `/free_fee_limits` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeFeeLimitsResponse {
    pub authority: Vec<u8>,
    pub limits: FreeFeeLimits,
    #[serde(rename = "processed_fee")]
    pub processed_fee: ProcessedFee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeFeeLimits {
    pub use_free_fee: bool,
    pub max_fee_amount: u64,
    pub max_fee_count: i32,
    pub max_token_account_creation_amount: u64,
    pub max_token_account_creation_count: i32,
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub secs: i64,
    pub nanos: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFee {
    pub total_fee_amount: u64,
    pub fee_count: i32,
    pub rent_count: i32,
}

impl From<&FreeFeeLimitsResponse> for UsageStatus {
    fn from(response: &FreeFeeLimitsResponse) -> Self {
        Self {
            max_usage: response.limits.max_fee_count,
            current_usage: response.processed_fee.fee_count,
            max_amount: response.limits.max_fee_amount,
            amount_used: response.processed_fee.total_fee_amount,
            reached_limit_link_creation: response.processed_fee.rent_count
                >= response.limits.max_token_account_creation_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash, pubkey::Pubkey, signature::Keypair, signer::Signer,
        system_instruction, transaction::Transaction,
    };

    use crate::models::FeeAmount;

    #[test]
    fn test_swap_data_wire_tags() {
        let direct = SwapData::Direct(DirectSwapData {
            program_id: "a".into(),
            account_pubkey: "b".into(),
            authority_pubkey: "c".into(),
            transfer_authority_pubkey: "d".into(),
            source_pubkey: "e".into(),
            destination_pubkey: "f".into(),
            pool_token_mint_pubkey: "g".into(),
            pool_fee_account_pubkey: "h".into(),
            amount_in: 1,
            minimum_amount_out: 2,
        });

        let encoded = serde_json::to_value(&direct).unwrap();
        assert!(encoded.get("Spl").is_some());
        assert!(encoded.get("SplTransitive").is_none());
        assert_eq!(encoded["Spl"]["amount_in"], 1);
    }

    #[test]
    fn test_request_paths() {
        let params = TransferSolParams {
            sender: String::new(),
            recipient: String::new(),
            amount: 0,
            signature: String::new(),
            blockhash: String::new(),
            stats_info: StatsInfo::new(OperationType::Transfer, None),
        };
        assert_eq!(RequestType::TransferSol(params).path(), "/transfer_sol");
    }

    #[test]
    fn test_relay_transaction_param_from_prepared_transaction() {
        let owner = Keypair::new();
        let fee_payer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let blockhash = Hash::new_unique();

        let mut transaction = Transaction::new_with_payer(
            &[system_instruction::transfer(&owner.pubkey(), &recipient, 42)],
            Some(&fee_payer),
        );
        transaction.try_partial_sign(&[&owner], blockhash).unwrap();

        let prepared = PreparedTransaction::new(
            transaction,
            vec![owner.insecure_clone()],
            FeeAmount::ZERO,
        );

        let param = RelayTransactionParam::new(
            &prepared,
            StatsInfo::new(OperationType::Transfer, Some("SOL".to_string())),
        )
        .unwrap();

        assert_eq!(param.blockhash, blockhash.to_string());
        assert_eq!(param.instructions.len(), 1);
        assert_eq!(param.pubkeys[0], fee_payer.to_string());

        // the owner's signature is keyed by its index in the account keys
        let owner_index = param
            .pubkeys
            .iter()
            .position(|key| *key == owner.pubkey().to_string())
            .unwrap();
        assert!(param.signatures.contains_key(&owner_index.to_string()));
    }

    #[test]
    fn test_usage_status_from_limits_response() {
        let response = FreeFeeLimitsResponse {
            authority: vec![1, 2, 3],
            limits: FreeFeeLimits {
                use_free_fee: true,
                max_fee_amount: 10_000_000,
                max_fee_count: 100,
                max_token_account_creation_amount: 10_000_000,
                max_token_account_creation_count: 30,
                period: Period { secs: 86_400, nanos: 0 },
            },
            processed_fee: ProcessedFee {
                total_fee_amount: 25_000,
                fee_count: 5,
                rent_count: 30,
            },
        };

        let status = UsageStatus::from(&response);
        assert_eq!(status.max_usage, 100);
        assert_eq!(status.current_usage, 5);
        assert_eq!(status.amount_used, 25_000);
        assert!(status.reached_limit_link_creation);
    }
}
