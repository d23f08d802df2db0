use crate::db::models::credits::{LedgerEntryDBResponse, LedgerEntryType};
use crate::types::{LedgerEntryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Request models

/// Admin adjustment of a user's balance (only admin_grant and admin_removal
/// entry types are accepted)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditAdjustmentCreate {
    pub entry_type: LedgerEntryType,
    /// Amount of credits (absolute value)
    pub amount: i64,
    /// Optional description of the adjustment
    pub description: Option<String>,
}

// Response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntryResponse {
    /// Entry ID
    #[schema(value_type = String, format = "uuid")]
    pub id: LedgerEntryId,
    /// User ID
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub entry_type: LedgerEntryType,
    /// Signed amount (negative for debits)
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    /// User ID
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Current credit balance
    pub credits: i64,
}

/// Query parameters for listing ledger entries
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListLedgerQuery {
    /// Number of items to skip
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

// Conversions
impl From<LedgerEntryDBResponse> for LedgerEntryResponse {
    fn from(db: LedgerEntryDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            entry_type: db.entry_type,
            amount: db.amount,
            balance_before: db.balance_before,
            balance_after: db.balance_after,
            reference_id: db.reference_id,
            reference_type: db.reference_type,
            description: db.description,
            created_at: db.created_at,
        }
    }
}
