//! Core domain types for the payment confirmation engine.
//!
//! Gateway-facing types (de)serialize with the gateway's camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Amount;
use crate::engine::GenerateError;

/// Opaque token returned with a generated code, used to look up its confirmation status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated request to pay `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentRequest {
    amount: Amount,
}

impl PaymentRequest {
    /// Only strictly positive amounts can be paid.
    pub fn new(amount: Amount) -> Result<Self, GenerateError> {
        if !amount.is_positive() {
            return Err(GenerateError::InvalidAmount(amount));
        }
        Ok(Self { amount })
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }
}

/// Response of the gateway's CreateCode operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub code: String,
    pub correlation_id: CorrelationId,
}

/// A generated payment code, ready to be shown to the payer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePayload {
    pub code: String,
    pub correlation_id: CorrelationId,
    /// Rendered code image; `None` when rendering failed.
    pub image: Option<Vec<u8>>,
}

/// Gateway verdict on a transaction.
///
/// Wire values: `0` confirmed, `1` pending, anything else is a rejection.
/// Build it from the wire value with `ResponseCode::from`; `Rejected` never holds 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ResponseCode {
    Confirmed,
    Pending,
    Rejected(i32),
}

impl From<i32> for ResponseCode {
    fn from(code: i32) -> Self {
        match code {
            0 => ResponseCode::Confirmed,
            1 => ResponseCode::Pending,
            other => ResponseCode::Rejected(other),
        }
    }
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::Confirmed => 0,
            ResponseCode::Pending => 1,
            ResponseCode::Rejected(other) => other,
        }
    }
}

/// A confirmed transfer, as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub from_account: String,
    pub to_account: String,
    pub currency: String,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: DateTime<Utc>,
    #[serde(default)]
    pub external_ref: Option<String>,
}

/// Response of the gateway's CheckTransaction operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub response_code: ResponseCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub record: Option<TransactionRecord>,
}

impl TransactionStatus {
    pub fn pending() -> Self {
        Self {
            response_code: ResponseCode::Pending,
            message: "transaction not found yet".to_string(),
            record: None,
        }
    }

    pub fn confirmed(record: TransactionRecord) -> Self {
        Self {
            response_code: ResponseCode::Confirmed,
            message: "transaction confirmed".to_string(),
            record: Some(record),
        }
    }

    /// Status carrying the raw wire `code`, classified through [`ResponseCode::from`].
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            response_code: ResponseCode::from(code),
            message: message.into(),
            record: None,
        }
    }
}
