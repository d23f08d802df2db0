//! Feedback model abstraction layer.
//!
//! This module defines the [`FeedbackModel`] trait which abstracts the
//! generative provider behind the three operations the product needs:
//! per-persona feedback, session summaries, and persona generation.
//!
//! Provider failures are recoverable at the call site: the feedback flow
//! converts them into per-persona failures rather than batch aborts.

use async_trait::async_trait;
use serde::Deserialize;

use crate::db::models::{
    personas::PersonaDBResponse,
    sessions::{PurchaseIntent, ResultDBResponse, Sentiment},
};

pub mod openai;

/// Result type for feedback model operations
pub type Result<T> = std::result::Result<T, AiError>;

/// Errors that can occur while calling the feedback model
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// The call exceeded the configured deadline. Treated exactly like any
    /// other per-persona failure by the feedback flow.
    #[error("feedback model call timed out")]
    Timeout,

    #[error("feedback model transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feedback model returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("feedback model returned malformed output: {0}")]
    Malformed(String),
}

/// One persona's reaction to the submitted content
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaFeedback {
    pub feedback_text: String,
    pub sentiment: Sentiment,
    pub purchase_intent: PurchaseIntent,
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Overall reaction score, 1 to 5
    pub score: i16,
}

/// A persona produced by the generation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedPersona {
    pub name: String,
    #[serde(default)]
    pub age_group: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object")]
    pub traits: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Abstract feedback model interface
#[async_trait]
pub trait FeedbackModel: Send + Sync {
    /// Simulate how `persona` would react to `content`
    async fn generate_feedback(&self, content: &str, persona: &PersonaDBResponse) -> Result<PersonaFeedback>;

    /// Summarize the collected results of one session into prose
    async fn generate_summary(&self, content: &str, results: &[ResultDBResponse]) -> Result<String>;

    /// Generate `count` new personas drawn from the given age groups
    async fn generate_personas(&self, age_groups: &[String], count: u32) -> Result<Vec<GeneratedPersona>>;
}
