//! Wire format of relay server errors and the best-effort classifier for
//! on-chain program logs.
//!
//! Log classification matches string patterns emitted by upstream
//! programs. Those strings can drift between releases, so everything
//! pattern-based lives here and degrades to an unclassified result
//! carrying the raw logs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Error body returned by the relay server: `{code, message, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RelayApiError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<ErrorDetail>,
}

impl RelayApiError {
    /// Parse the attached program logs into a classified client error.
    /// Returns `None` when the error carries no client-error payload.
    pub fn client_error(&self) -> Option<RelayClientError> {
        let data = self.data.as_ref()?;
        if data.kind != ErrorKind::ClientError {
            return None;
        }

        if self
            .message
            .contains("connection closed before message completed")
        {
            return Some(RelayClientError {
                program_logs: vec![],
                kind: Some(ClientErrorKind::ConnectionClosedBeforeMessageCompleted),
                error_log: Some("connection closed before message completed".to_string()),
            });
        }

        let raw = data.data.as_ref()?.logs()?.first()?.clone();
        let program_logs = extract_program_logs(&raw);
        let error_log = program_logs
            .iter()
            .find(|log| ERROR_PREFIXES.iter().any(|prefix| log.starts_with(prefix)))
            .cloned();

        let kind = error_log.as_deref().and_then(classify_error_log);

        Some(RelayClientError {
            program_logs,
            kind,
            error_log: error_log.map(strip_error_prefixes),
        })
    }
}

/// `data` field of a relay server error: a single-entry map keyed by the
/// wire error type, or a bare error type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub data: Option<ErrorData>,
}

impl<'de> Deserialize<'de> for ErrorDetail {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Tagged(HashMap<String, ErrorData>),
            Bare(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Tagged(map) => {
                let (key, data) = map
                    .into_iter()
                    .next()
                    .unwrap_or(("Unknown".to_string(), ErrorData::Logs(vec![])));
                Ok(Self {
                    kind: ErrorKind::from_wire(&key),
                    data: Some(data),
                })
            }
            Wire::Bare(key) => Ok(Self {
                kind: ErrorKind::from_wire(&key),
                data: None,
            }),
        }
    }
}

/// Payload attached to an error type: program logs or named amounts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorData {
    Logs(Vec<String>),
    Amounts(HashMap<String, u64>),
}

impl ErrorData {
    pub fn logs(&self) -> Option<&Vec<String>> {
        match self {
            Self::Logs(logs) => Some(logs),
            Self::Amounts(_) => None,
        }
    }
}

/// Known relay server error types.
///
/// The wire constants are fixed by the server; `NotEnoughBalance ` really
/// does carry a trailing space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseHashError,
    ParsePubkeyError,
    ParseKeypairError,
    ParseSignatureError,
    WrongSignature,
    SignerError,
    ClientError,
    ProgramError,
    TooSmallAmount,
    NotEnoughBalance,
    NotEnoughTokenBalance,
    DecimalsMismatch,
    TokenAccountNotFound,
    IncorrectAccountOwner,
    TokenMintMismatch,
    UnsupportedRecipientAddress,
    FeeCalculatorNotFound,
    NotEnoughOutAmount,
    UnknownSwapProgramId,
    Unknown,
}

impl ErrorKind {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "ParseHashError" => Self::ParseHashError,
            "ParsePubkeyError" => Self::ParsePubkeyError,
            "ParseKeypairError" => Self::ParseKeypairError,
            "ParseSignatureError" => Self::ParseSignatureError,
            "WrongSignature" => Self::WrongSignature,
            "SignerError" => Self::SignerError,
            "ClientError" => Self::ClientError,
            "ProgramError" => Self::ProgramError,
            "TooSmallAmount" => Self::TooSmallAmount,
            "NotEnoughBalance " => Self::NotEnoughBalance,
            "NotEnoughTokenBalance" => Self::NotEnoughTokenBalance,
            "DecimalsMismatch" => Self::DecimalsMismatch,
            "TokenAccountNotFound" => Self::TokenAccountNotFound,
            "IncorrectAccountOwner" => Self::IncorrectAccountOwner,
            "TokenMintMismatch" => Self::TokenMintMismatch,
            "UnsupportedRecipientAddress" => Self::UnsupportedRecipientAddress,
            "FeeCalculatorNotFound" => Self::FeeCalculatorNotFound,
            "NotEnoughOutAmount" => Self::NotEnoughOutAmount,
            "UnknownSwapProgramId" => Self::UnknownSwapProgramId,
            _ => Self::Unknown,
        }
    }
}

/// Classification of a failed on-chain execution, recovered from program
/// logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayClientError {
    pub program_logs: Vec<String>,
    pub kind: Option<ClientErrorKind>,
    pub error_log: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    InsufficientFunds,
    MaximumNumberOfInstructionsAllowedExceeded,
    ConnectionClosedBeforeMessageCompleted,
    GivenPoolTokenAmountResultsInZeroTradingTokens,
    SwapInstructionExceedsDesiredSlippageLimit,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InsufficientFunds => "Insufficient funds",
            Self::MaximumNumberOfInstructionsAllowedExceeded => {
                "Exceeded maximum number of instructions allowed"
            }
            Self::ConnectionClosedBeforeMessageCompleted => {
                "Connection closed before message completed"
            }
            Self::GivenPoolTokenAmountResultsInZeroTradingTokens => {
                "Given pool token amount results in zero trading tokens"
            }
            Self::SwapInstructionExceedsDesiredSlippageLimit => {
                "Swap instruction exceeds desired slippage limit"
            }
        };
        f.write_str(text)
    }
}

const ERROR_PREFIXES: [&str; 3] = [
    "Program failed to complete: ",
    "Program log: Error: ",
    "Transfer: insufficient lamports ",
];

/// Pull quoted `Program ...` / `Transfer: ...` entries out of a raw log
/// line. Quoted segments sit at odd positions after splitting on `"`.
fn extract_program_logs(raw: &str) -> Vec<String> {
    raw.split('"')
        .skip(1)
        .step_by(2)
        .filter(|segment| segment.starts_with("Program") || segment.starts_with("Transfer:"))
        .map(str::to_owned)
        .collect()
}

fn classify_error_log(log: &str) -> Option<ClientErrorKind> {
    if log.contains("exceeded maximum number of instructions allowed") {
        Some(ClientErrorKind::MaximumNumberOfInstructionsAllowedExceeded)
    } else if log.contains("insufficient funds") || log.contains("insufficient lamports") {
        Some(ClientErrorKind::InsufficientFunds)
    } else if log.contains("Given pool token amount results in zero trading tokens") {
        Some(ClientErrorKind::GivenPoolTokenAmountResultsInZeroTradingTokens)
    } else if log.contains("Swap instruction exceeds desired slippage limit") {
        Some(ClientErrorKind::SwapInstructionExceedsDesiredSlippageLimit)
    } else {
        None
    }
}

fn strip_error_prefixes(log: String) -> String {
    log.replace("Program failed to complete: ", "")
        .replace("Program log: Error: ", "")
        .replace("Transfer: ", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_with_log_array() {
        let raw = r#"{
            "code": 6,
            "message": "Transaction simulation failed",
            "data": {
                "ClientError": [
                    "RpcError: \"Program log: Error: insufficient funds\" \"Program consumed 12345 units\""
                ]
            }
        }"#;

        let err: RelayApiError = serde_json::from_str(raw).unwrap();
        assert_eq!(err.code, 6);
        assert_eq!(err.data.as_ref().unwrap().kind, ErrorKind::ClientError);

        let client_error = err.client_error().unwrap();
        assert_eq!(client_error.kind, Some(ClientErrorKind::InsufficientFunds));
        assert_eq!(
            client_error.error_log.as_deref(),
            Some("insufficient funds")
        );
        assert_eq!(
            client_error.program_logs,
            vec![
                "Program log: Error: insufficient funds".to_string(),
                "Program consumed 12345 units".to_string(),
            ]
        );
    }

    #[test]
    fn test_decode_not_enough_balance_with_trailing_space() {
        let raw = r#"{
            "code": 3,
            "message": "Not enough balance",
            "data": { "NotEnoughBalance ": { "expected": 2039280, "found": 19266 } }
        }"#;

        let err: RelayApiError = serde_json::from_str(raw).unwrap();
        let detail = err.data.unwrap();
        assert_eq!(detail.kind, ErrorKind::NotEnoughBalance);
        assert_eq!(
            detail.data,
            Some(ErrorData::Amounts(HashMap::from([
                ("expected".to_string(), 2_039_280),
                ("found".to_string(), 19_266),
            ])))
        );
    }

    #[test]
    fn test_unknown_pattern_degrades_gracefully() {
        let raw = r#"{
            "code": 6,
            "message": "Transaction simulation failed",
            "data": {
                "ClientError": [
                    "RpcError: \"Program failed to complete: some brand new failure mode\""
                ]
            }
        }"#;

        let err: RelayApiError = serde_json::from_str(raw).unwrap();
        let client_error = err.client_error().unwrap();
        assert_eq!(client_error.kind, None);
        assert_eq!(
            client_error.error_log.as_deref(),
            Some("some brand new failure mode")
        );
        assert!(!client_error.program_logs.is_empty());
    }

    #[test]
    fn test_connection_closed_shortcut() {
        let raw = r#"{
            "code": 6,
            "message": "hyper: connection closed before message completed",
            "data": { "ClientError": [] }
        }"#;

        let err: RelayApiError = serde_json::from_str(raw).unwrap();
        let client_error = err.client_error().unwrap();
        assert_eq!(
            client_error.kind,
            Some(ClientErrorKind::ConnectionClosedBeforeMessageCompleted)
        );
    }

    #[test]
    fn test_non_client_error_has_no_classification() {
        let raw = r#"{
            "code": 3,
            "message": "Too small amount",
            "data": "TooSmallAmount"
        }"#;

        let err: RelayApiError = serde_json::from_str(raw).unwrap();
        assert_eq!(err.data.as_ref().unwrap().kind, ErrorKind::TooSmallAmount);
        assert!(err.client_error().is_none());
    }
}
