//! OpenAI-compatible implementation of the feedback model.
//!
//! Requests are plain chat-completion calls against any OpenAI-compatible
//! API. Structured outputs (feedback, personas) use JSON mode and are parsed
//! from the first choice's message content; the summary is returned as prose.
//!
//! Every call runs under the configured deadline: a timeout is reported as
//! [`AiError::Timeout`] and handled upstream as a per-persona failure.

use async_openai::types::chat::CreateChatCompletionResponse;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::instrument;

use crate::{
    ai::{AiError, FeedbackModel, GeneratedPersona, PersonaFeedback, Result},
    config::AiConfig,
    db::models::{personas::PersonaDBResponse, sessions::ResultDBResponse},
};

pub struct OpenAiModel {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout: std::time::Duration,
}

impl OpenAiModel {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.request_timeout,
        }
    }

    /// One chat-completion round trip, returning the first choice's content
    async fn chat(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let request = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AiError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CreateChatCompletionResponse = response.json().await?;

        completion
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AiError::Malformed("completion contained no message content".to_string()))
    }

    /// Parse a JSON-mode completion into the expected shape
    fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T> {
        serde_json::from_str(content).map_err(|e| AiError::Malformed(format!("{e}: {content}")))
    }
}

#[async_trait::async_trait]
impl FeedbackModel for OpenAiModel {
    #[instrument(skip(self, content, persona), fields(persona = %persona.name), err)]
    async fn generate_feedback(&self, content: &str, persona: &PersonaDBResponse) -> Result<PersonaFeedback> {
        let system = "You simulate how a specific customer persona reacts to marketing content. \
                      Respond with a JSON object with keys: feedback_text (string, first person), \
                      sentiment (positive|neutral|negative), purchase_intent (high|medium|low|none), \
                      key_points (array of short strings), score (integer 1-5).";
        let user = format!(
            "Persona:\nname: {}\nage group: {}\noccupation: {}\ndescription: {}\ntraits: {}\n\nContent to evaluate:\n{}",
            persona.name,
            persona.age_group.as_deref().unwrap_or("unknown"),
            persona.occupation.as_deref().unwrap_or("unknown"),
            persona.description.as_deref().unwrap_or(""),
            persona.traits,
            content
        );

        let raw = self.chat(system, &user, true).await?;
        let feedback: PersonaFeedback = Self::parse_json(&raw)?;

        if !(1..=5).contains(&feedback.score) {
            return Err(AiError::Malformed(format!("score {} outside 1-5", feedback.score)));
        }

        Ok(feedback)
    }

    #[instrument(skip_all, fields(results = results.len()), err)]
    async fn generate_summary(&self, content: &str, results: &[ResultDBResponse]) -> Result<String> {
        let system = "You summarize persona feedback on marketing content into a short, \
                      actionable paragraph for the content's author. Respond with prose only.";
        let mut user = format!("Content:\n{content}\n\nPersona reactions:\n");
        for result in results {
            user.push_str(&format!(
                "- {} (sentiment: {:?}, intent: {:?}, score {}): {}\n",
                result.persona_name, result.sentiment, result.purchase_intent, result.score, result.feedback_text
            ));
        }

        self.chat(system, &user, false).await
    }

    #[instrument(skip(self), fields(count), err)]
    async fn generate_personas(&self, age_groups: &[String], count: u32) -> Result<Vec<GeneratedPersona>> {
        let system = "You invent realistic customer personas for product research. Respond with a \
                      JSON object {\"personas\": [...]} where each persona has keys: name, \
                      age_group, occupation, description, traits (object of freeform attributes).";
        let user = format!(
            "Generate {count} distinct personas spread across these age groups: {}.",
            age_groups.join(", ")
        );

        #[derive(serde::Deserialize)]
        struct PersonaBatch {
            personas: Vec<GeneratedPersona>,
        }

        let raw = self.chat(system, &user, true).await?;
        let batch: PersonaBatch = Self::parse_json(&raw)?;

        if batch.personas.is_empty() {
            return Err(AiError::Malformed("provider returned no personas".to_string()));
        }

        Ok(batch.personas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiConfig;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_persona() -> PersonaDBResponse {
        PersonaDBResponse {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            name: "Thrifty Tina".to_string(),
            age_group: Some("25-34".to_string()),
            occupation: Some("Teacher".to_string()),
            description: Some("Hunts for bargains".to_string()),
            traits: serde_json::json!({"price_sensitivity": "high"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn model_for(server: &MockServer) -> OpenAiModel {
        let mut config = AiConfig::default();
        config.api_base = url::Url::parse(&server.uri()).unwrap();
        config.api_key = "test-key".to_string();
        config.request_timeout = std::time::Duration::from_secs(2);
        OpenAiModel::new(&config)
    }

    fn completion_with_content(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn test_generate_feedback_parses_json_reply() {
        let server = MockServer::start().await;
        let reply = r#"{"feedback_text":"I like the price angle","sentiment":"positive","purchase_intent":"high","key_points":["price"],"score":4}"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with_content(reply)))
            .mount(&server)
            .await;

        let model = model_for(&server);
        let feedback = model.generate_feedback("Great deal!", &test_persona()).await.unwrap();

        assert_eq!(feedback.score, 4);
        assert_eq!(feedback.key_points, vec!["price"]);
        assert_eq!(feedback.sentiment, crate::db::models::sessions::Sentiment::Positive);
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_malformed() {
        let server = MockServer::start().await;
        let reply = r#"{"feedback_text":"x","sentiment":"neutral","purchase_intent":"low","key_points":[],"score":9}"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with_content(reply)))
            .mount(&server)
            .await;

        let model = model_for(&server);
        let err = model.generate_feedback("x", &test_persona()).await.unwrap_err();
        assert!(matches!(err, AiError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_api_error_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let model = model_for(&server);
        let err = model.generate_feedback("x", &test_persona()).await.unwrap_err();
        assert!(matches!(err, AiError::Api { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_with_content("{}"))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut config = AiConfig::default();
        config.api_base = url::Url::parse(&server.uri()).unwrap();
        config.request_timeout = std::time::Duration::from_millis(100);
        let model = OpenAiModel::new(&config);

        let err = model.generate_feedback("x", &test_persona()).await.unwrap_err();
        assert!(matches!(err, AiError::Timeout));
    }

    #[tokio::test]
    async fn test_generate_summary_returns_prose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_with_content("Overall positive reception.")))
            .mount(&server)
            .await;

        let model = model_for(&server);
        let summary = model.generate_summary("content", &[]).await.unwrap();
        assert_eq!(summary, "Overall positive reception.");
    }
}
