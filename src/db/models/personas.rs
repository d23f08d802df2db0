//! Database models for customer personas.

use crate::types::{PersonaId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a persona
#[derive(Debug, Clone)]
pub struct PersonaCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    pub traits: serde_json::Value,
}

/// Database request for updating a persona. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct PersonaUpdateDBRequest {
    pub name: Option<String>,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    pub traits: Option<serde_json::Value>,
}

/// Database response for a persona
#[derive(Debug, Clone)]
pub struct PersonaDBResponse {
    pub id: PersonaId,
    pub user_id: UserId,
    pub name: String,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    pub traits: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
