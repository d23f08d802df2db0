use crate::db::models::sessions::{InputType, PurchaseIntent, ResultDBResponse, Sentiment, SessionDBResponse, SessionStatus};
use crate::types::{PersonaId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// Request models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionCreate {
    pub input_type: InputType,
    /// The content to evaluate (text, URL, or a stored file reference)
    pub input_content: String,
    /// Personas the content will be evaluated against. Billing is one credit
    /// per persona, debited when the session is created.
    #[schema(value_type = Vec<String>)]
    pub persona_ids: Vec<PersonaId>,
}

/// Request body for running generation on an existing session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateFeedbackRequest {
    #[schema(value_type = Vec<String>)]
    pub persona_ids: Vec<PersonaId>,
}

// Response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Session ID
    #[schema(value_type = String, format = "uuid")]
    pub id: SessionId,
    /// Owning user ID
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub input_type: InputType,
    pub input_content: String,
    pub status: SessionStatus,
    /// Committed spend after reconciliation (refunds for failed personas
    /// reduce this)
    pub credits_used: i64,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedbackResultResponse {
    /// Result ID
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    /// Persona this reaction belongs to
    #[schema(value_type = String, format = "uuid")]
    pub persona_id: PersonaId,
    pub persona_name: String,
    pub feedback_text: String,
    pub sentiment: Sentiment,
    pub purchase_intent: PurchaseIntent,
    pub key_points: Vec<String>,
    /// Overall reaction score, 1 to 5
    pub score: i16,
    pub created_at: DateTime<Utc>,
}

/// A session with its collected results
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionWithResultsResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub results: Vec<FeedbackResultResponse>,
}

/// Query parameters for listing sessions
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListSessionsQuery {
    /// Number of items to skip
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

// Conversions

impl From<SessionDBResponse> for SessionResponse {
    fn from(db: SessionDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            input_type: db.input_type,
            input_content: db.input_content,
            status: db.status,
            credits_used: db.credits_used,
            summary: db.summary,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<ResultDBResponse> for FeedbackResultResponse {
    fn from(db: ResultDBResponse) -> Self {
        Self {
            id: db.id,
            persona_id: db.persona_id,
            persona_name: db.persona_name,
            feedback_text: db.feedback_text,
            sentiment: db.sentiment,
            purchase_intent: db.purchase_intent,
            key_points: db.key_points,
            score: db.score,
            created_at: db.created_at,
        }
    }
}
