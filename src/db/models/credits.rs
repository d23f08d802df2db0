//! Database models for the credit ledger.

use crate::types::{LedgerEntryId, PaymentId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ledger entry type enum stored as TEXT in the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    SignupGrant,
    Purchase,
    PurchaseRefund,
    FeedbackSpend,
    RefundFeedbackPartial,
    AdminGrant,
    AdminRemoval,
}

/// Audit context attached to a ledger entry. Freeform beyond `entry_type`:
/// the reference fields tie the entry to its causing event for later auditing.
#[derive(Debug, Clone)]
pub struct LedgerEntryOptions {
    pub entry_type: LedgerEntryType,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}

impl LedgerEntryOptions {
    pub fn new(entry_type: LedgerEntryType) -> Self {
        Self {
            entry_type,
            reference_id: None,
            reference_type: None,
            description: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// Context for a spend or refund caused by a feedback session
    pub fn for_session(entry_type: LedgerEntryType, session_id: SessionId) -> Self {
        Self {
            reference_id: Some(session_id.to_string()),
            reference_type: Some("feedback_session".to_string()),
            ..Self::new(entry_type)
        }
    }

    /// Context for a purchase or refund caused by a payment record
    pub fn for_payment(entry_type: LedgerEntryType, payment_id: PaymentId) -> Self {
        Self {
            reference_id: Some(payment_id.to_string()),
            reference_type: Some("payment_record".to_string()),
            ..Self::new(entry_type)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Database response for a ledger entry
#[derive(Debug, Clone)]
pub struct LedgerEntryDBResponse {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
