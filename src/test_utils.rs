//! Shared fixtures for tests: accounts, personas, app state, and a scripted
//! feedback model.

use std::collections::HashSet;
use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    ai::{AiError, FeedbackModel, GeneratedPersona, PersonaFeedback},
    auth::session,
    config::{Config, CreditPackage},
    db::{
        handlers::{Ledger, Personas, Repository, Users},
        models::{
            credits::{LedgerEntryOptions, LedgerEntryType},
            personas::{PersonaCreateDBRequest, PersonaDBResponse},
            sessions::{PurchaseIntent, ResultDBResponse, Sentiment},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    AppState,
};

/// A config with a JWT secret and two configured credit packages
pub fn test_config_with_packages() -> Config {
    Config {
        secret_key: Some("test-secret-key".to_string()),
        packages: vec![
            CreditPackage {
                name: "starter".to_string(),
                variant_id: "111".to_string(),
                credits: 50,
                price_cents: 900,
            },
            CreditPackage {
                name: "pro".to_string(),
                variant_id: "222".to_string(),
                credits: 200,
                price_cents: 2900,
            },
        ],
        ..Default::default()
    }
}

/// App state over the given pool and config, with a default [`StaticModel`]
/// and whatever payment provider the config names
pub fn build_test_state(pool: PgPool, config: Config) -> AppState {
    let payment = crate::payment_providers::create_provider(&config);
    AppState {
        db: pool,
        config,
        model: Arc::new(StaticModel::default()),
        payment,
    }
}

async fn create_user(pool: &PgPool, credits: i64, is_admin: bool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("acquire connection");

    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: format!("user-{}@example.com", uuid::Uuid::new_v4()),
            display_name: Some("Test User".to_string()),
            avatar_url: None,
            auth_source: "google".to_string(),
            is_admin,
        })
        .await
        .expect("create test user");

    if credits > 0 {
        Ledger::new(&mut conn)
            .credit(
                user.id,
                credits,
                &LedgerEntryOptions::new(LedgerEntryType::AdminGrant).with_description("test seed"),
            )
            .await
            .expect("seed test credits");
    }

    Users::new(&mut conn)
        .get_by_id(user.id)
        .await
        .expect("reload test user")
        .expect("test user exists")
}

/// A regular account seeded with the given balance (ledger-recorded)
pub async fn create_test_user(pool: &PgPool, credits: i64) -> UserDBResponse {
    create_user(pool, credits, false).await
}

/// An admin account
pub async fn create_test_admin(pool: &PgPool) -> UserDBResponse {
    create_user(pool, 0, true).await
}

pub async fn create_test_persona(pool: &PgPool, user_id: crate::types::UserId, name: &str) -> PersonaDBResponse {
    let mut conn = pool.acquire().await.expect("acquire connection");
    Personas::new(&mut conn)
        .create(&PersonaCreateDBRequest {
            user_id,
            name: name.to_string(),
            age_group: Some("25-34".to_string()),
            occupation: Some("Engineer".to_string()),
            description: None,
            traits: serde_json::json!({"interests": ["tech"]}),
        })
        .await
        .expect("create test persona")
}

/// A `Bearer` header value carrying a session token for the given user,
/// signed with the [`test_config_with_packages`] secret
pub fn auth_header_for(user: &UserDBResponse) -> String {
    let config = test_config_with_packages();
    let current_user = crate::api::models::users::CurrentUser {
        id: user.id,
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        avatar_url: user.avatar_url.clone(),
        is_admin: user.is_admin,
    };
    let token = session::create_session_token(&current_user, &config).expect("sign session token");
    format!("Bearer {token}")
}

/// Scripted feedback model: succeeds with canned output unless told to fail
/// for specific persona names (or everything).
#[derive(Debug, Default, Clone)]
pub struct StaticModel {
    fail_personas: HashSet<String>,
    fail_all: bool,
}

impl StaticModel {
    /// Fail generation for exactly these persona names
    pub fn failing_for<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            fail_personas: names.into_iter().map(Into::into).collect(),
            fail_all: false,
        }
    }

    /// Fail every operation
    pub fn failing_everything() -> Self {
        Self {
            fail_personas: HashSet::new(),
            fail_all: true,
        }
    }

    fn scripted_failure(&self) -> AiError {
        AiError::Api {
            status: 500,
            message: "scripted failure".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl FeedbackModel for StaticModel {
    async fn generate_feedback(
        &self,
        _content: &str,
        persona: &PersonaDBResponse,
    ) -> crate::ai::Result<PersonaFeedback> {
        if self.fail_all || self.fail_personas.contains(&persona.name) {
            return Err(self.scripted_failure());
        }

        Ok(PersonaFeedback {
            feedback_text: format!("{} finds this compelling", persona.name),
            sentiment: Sentiment::Positive,
            purchase_intent: PurchaseIntent::Medium,
            key_points: vec!["value".to_string()],
            score: 4,
        })
    }

    async fn generate_summary(&self, _content: &str, results: &[ResultDBResponse]) -> crate::ai::Result<String> {
        if self.fail_all {
            return Err(self.scripted_failure());
        }
        Ok(format!("{} personas reacted, overall positive.", results.len()))
    }

    async fn generate_personas(&self, age_groups: &[String], count: u32) -> crate::ai::Result<Vec<GeneratedPersona>> {
        if self.fail_all {
            return Err(self.scripted_failure());
        }
        Ok((0..count)
            .map(|i| GeneratedPersona {
                name: format!("Generated Persona {i}"),
                age_group: age_groups.get(i as usize % age_groups.len()).cloned(),
                occupation: Some("Analyst".to_string()),
                description: Some("Synthesized for testing".to_string()),
                traits: serde_json::json!({}),
            })
            .collect())
    }
}
