//! Database models for feedback sessions and their per-persona results.

use crate::types::{PersonaId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Kind of content submitted for evaluation, stored as TEXT
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Url,
    File,
}

/// Session lifecycle, stored as TEXT.
///
/// pending -> processing -> completed (at least one result)
///                       -> failed    (zero results)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Persona reaction sentiment reported by the feedback model, stored as TEXT
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Persona purchase intent reported by the feedback model, stored as TEXT
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseIntent {
    High,
    Medium,
    Low,
    None,
}

/// Database request for creating a feedback session
#[derive(Debug, Clone)]
pub struct SessionCreateDBRequest {
    pub user_id: UserId,
    pub input_type: InputType,
    pub input_content: String,
    pub credits_used: i64,
}

/// Database response for a feedback session
#[derive(Debug, Clone)]
pub struct SessionDBResponse {
    pub id: SessionId,
    pub user_id: UserId,
    pub input_type: InputType,
    pub input_content: String,
    pub status: SessionStatus,
    pub credits_used: i64,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database request for persisting one persona's feedback
#[derive(Debug, Clone)]
pub struct ResultCreateDBRequest {
    pub session_id: SessionId,
    pub persona_id: PersonaId,
    pub persona_name: String,
    pub feedback_text: String,
    pub sentiment: Sentiment,
    pub purchase_intent: PurchaseIntent,
    pub key_points: Vec<String>,
    pub score: i16,
}

/// Database response for a feedback result
#[derive(Debug, Clone)]
pub struct ResultDBResponse {
    pub id: Uuid,
    pub session_id: SessionId,
    pub persona_id: PersonaId,
    pub persona_name: String,
    pub feedback_text: String,
    pub sentiment: Sentiment,
    pub purchase_intent: PurchaseIntent,
    pub key_points: Vec<String>,
    pub score: i16,
    pub created_at: DateTime<Utc>,
}
