use crate::db::models::personas::{PersonaCreateDBRequest, PersonaDBResponse, PersonaUpdateDBRequest};
use crate::types::{PersonaId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Request models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonaCreate {
    pub name: String,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    /// Freeform attributes (interests, pain points, buying behavior, ...)
    #[serde(default)]
    pub traits: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PersonaUpdate {
    pub name: Option<String>,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    pub traits: Option<serde_json::Value>,
}

/// Request for AI persona generation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratePersonasRequest {
    /// Age groups to draw personas from (e.g., "25-34")
    pub age_groups: Vec<String>,
    /// How many personas to generate
    pub count: u32,
}

// Response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonaResponse {
    /// Persona ID
    #[schema(value_type = String, format = "uuid")]
    pub id: PersonaId,
    /// Owning user ID
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub name: String,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    pub traits: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters for listing personas
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPersonasQuery {
    /// Number of items to skip
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

// Conversions

impl From<PersonaDBResponse> for PersonaResponse {
    fn from(db: PersonaDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            age_group: db.age_group,
            occupation: db.occupation,
            description: db.description,
            traits: db.traits,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl PersonaCreate {
    pub fn into_db_request(self, user_id: UserId) -> PersonaCreateDBRequest {
        PersonaCreateDBRequest {
            user_id,
            name: self.name,
            age_group: self.age_group,
            occupation: self.occupation,
            description: self.description,
            traits: self.traits.unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        }
    }
}

impl From<PersonaUpdate> for PersonaUpdateDBRequest {
    fn from(update: PersonaUpdate) -> Self {
        Self {
            name: update.name,
            age_group: update.age_group,
            occupation: update.occupation,
            description: update.description,
            traits: update.traits,
        }
    }
}
