//! Database models for payment records.

use crate::types::{PaymentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Payment record status, stored as TEXT.
///
/// Per external order the lifecycle is `completed -> refunded`, with no
/// further transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Completed,
    Refunded,
}

/// Database request for recording a paid order
#[derive(Debug, Clone)]
pub struct PaymentCreateDBRequest {
    pub user_id: UserId,
    pub external_order_id: String,
    pub package_name: String,
    pub credits_amount: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub metadata: serde_json::Value,
}

/// Database response for a payment record
#[derive(Debug, Clone)]
pub struct PaymentDBResponse {
    pub id: PaymentId,
    pub user_id: UserId,
    pub external_order_id: String,
    pub package_name: String,
    pub credits_amount: i64,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
