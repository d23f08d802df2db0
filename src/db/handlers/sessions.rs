//! Database repository for feedback sessions and their results.

use crate::db::{
    errors::{DbError, Result},
    models::sessions::{
        InputType, ResultCreateDBRequest, ResultDBResponse, SessionCreateDBRequest, SessionDBResponse, SessionStatus,
    },
};
use crate::types::{abbrev_uuid, PersonaId, SessionId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

// Database entity model for a session
#[derive(Debug, Clone, FromRow)]
struct FeedbackSession {
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

impl From<FeedbackSession> for SessionDBResponse {
    fn from(s: FeedbackSession) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            input_type: s.input_type,
            input_content: s.input_content,
            status: s.status,
            credits_used: s.credits_used,
            summary: s.summary,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

// Database entity model for a per-persona result
#[derive(Debug, Clone, FromRow)]
struct FeedbackResult {
    pub id: Uuid,
    pub session_id: SessionId,
    pub persona_id: PersonaId,
    pub persona_name: String,
    pub feedback_text: String,
    pub sentiment: crate::db::models::sessions::Sentiment,
    pub purchase_intent: crate::db::models::sessions::PurchaseIntent,
    pub key_points: Json<Vec<String>>,
    pub score: i16,
    pub created_at: DateTime<Utc>,
}

impl From<FeedbackResult> for ResultDBResponse {
    fn from(r: FeedbackResult) -> Self {
        Self {
            id: r.id,
            session_id: r.session_id,
            persona_id: r.persona_id,
            persona_name: r.persona_name,
            feedback_text: r.feedback_text,
            sentiment: r.sentiment,
            purchase_intent: r.purchase_intent,
            key_points: r.key_points.0,
            score: r.score,
            created_at: r.created_at,
        }
    }
}

pub struct FeedbackSessions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> FeedbackSessions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a new session in `pending` state. Callers run this inside the
    /// same transaction as the ledger debit so a session can never exist
    /// without its debit (or vice versa).
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn create(&mut self, request: &SessionCreateDBRequest) -> Result<SessionDBResponse> {
        let session = sqlx::query_as::<_, FeedbackSession>(
            r#"
            INSERT INTO feedback_sessions (user_id, input_type, input_content, status, credits_used)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(request.input_type)
        .bind(&request.input_content)
        .bind(request.credits_used)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(SessionDBResponse::from(session))
    }

    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: SessionId) -> Result<Option<SessionDBResponse>> {
        let session = sqlx::query_as::<_, FeedbackSession>("SELECT * FROM feedback_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(session.map(SessionDBResponse::from))
    }

    /// Fetch a session only if it belongs to the given owner
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_owned(&mut self, id: SessionId, user_id: UserId) -> Result<Option<SessionDBResponse>> {
        let session = sqlx::query_as::<_, FeedbackSession>("SELECT * FROM feedback_sessions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(session.map(SessionDBResponse::from))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), skip, limit), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<SessionDBResponse>> {
        let sessions = sqlx::query_as::<_, FeedbackSession>(
            "SELECT * FROM feedback_sessions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(sessions.into_iter().map(SessionDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id), status = ?status), err)]
    pub async fn set_status(&mut self, id: SessionId, status: SessionStatus) -> Result<SessionDBResponse> {
        let session = sqlx::query_as::<_, FeedbackSession>(
            "UPDATE feedback_sessions SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(SessionDBResponse::from(session))
    }

    /// Reduce committed spend after a partial failure. Runs in the same
    /// transaction as the corresponding ledger refund.
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&id), amount), err)]
    pub async fn decrement_credits_used(&mut self, id: SessionId, amount: i64) -> Result<SessionDBResponse> {
        let session = sqlx::query_as::<_, FeedbackSession>(
            "UPDATE feedback_sessions SET credits_used = credits_used - $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(SessionDBResponse::from(session))
    }

    /// Persist the generated summary, overwriting any previous one
    #[instrument(skip(self, summary), fields(session_id = %abbrev_uuid(&id)), err)]
    pub async fn set_summary(&mut self, id: SessionId, summary: &str) -> Result<SessionDBResponse> {
        let session = sqlx::query_as::<_, FeedbackSession>(
            "UPDATE feedback_sessions SET summary = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(summary)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(SessionDBResponse::from(session))
    }

    /// Persist one persona's feedback
    #[instrument(skip(self, request), fields(session_id = %abbrev_uuid(&request.session_id), persona = %request.persona_name), err)]
    pub async fn add_result(&mut self, request: &ResultCreateDBRequest) -> Result<ResultDBResponse> {
        let result = sqlx::query_as::<_, FeedbackResult>(
            r#"
            INSERT INTO feedback_results
                (session_id, persona_id, persona_name, feedback_text, sentiment, purchase_intent, key_points, score)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(request.session_id)
        .bind(request.persona_id)
        .bind(&request.persona_name)
        .bind(&request.feedback_text)
        .bind(request.sentiment)
        .bind(request.purchase_intent)
        .bind(Json(&request.key_points))
        .bind(request.score)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(ResultDBResponse::from(result))
    }

    /// Results of a session, in completion order
    #[instrument(skip(self), fields(session_id = %abbrev_uuid(&session_id)), err)]
    pub async fn list_results(&mut self, session_id: SessionId) -> Result<Vec<ResultDBResponse>> {
        let results = sqlx::query_as::<_, FeedbackResult>(
            "SELECT * FROM feedback_results WHERE session_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(results.into_iter().map(ResultDBResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::sessions::{PurchaseIntent, Sentiment};
    use crate::test_utils::create_test_user;
    use sqlx::PgPool;

    async fn make_session(pool: &PgPool, user_id: UserId, credits_used: i64) -> SessionDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        FeedbackSessions::new(&mut conn)
            .create(&SessionCreateDBRequest {
                user_id,
                input_type: InputType::Text,
                input_content: "A new kind of coffee subscription".to_string(),
                credits_used,
            })
            .await
            .unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_session_lifecycle(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let session = make_session(&pool, user.id, 3).await;
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.credits_used, 3);

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = FeedbackSessions::new(&mut conn);

        let session = repo.set_status(session.id, SessionStatus::Processing).await.unwrap();
        assert_eq!(session.status, SessionStatus::Processing);

        let session = repo.decrement_credits_used(session.id, 1).await.unwrap();
        assert_eq!(session.credits_used, 2);

        let session = repo.set_summary(session.id, "Mostly positive.").await.unwrap();
        assert_eq!(session.summary.as_deref(), Some("Mostly positive."));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_results_round_trip_in_completion_order(pool: PgPool) {
        let user = create_test_user(&pool, 0).await;
        let session = make_session(&pool, user.id, 2).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = FeedbackSessions::new(&mut conn);

        for name in ["First", "Second"] {
            repo.add_result(&ResultCreateDBRequest {
                session_id: session.id,
                persona_id: uuid::Uuid::new_v4(),
                persona_name: name.to_string(),
                feedback_text: format!("{name} liked it"),
                sentiment: Sentiment::Positive,
                purchase_intent: PurchaseIntent::High,
                key_points: vec!["price".to_string(), "design".to_string()],
                score: 4,
            })
            .await
            .unwrap();
        }

        let results = repo.list_results(session.id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].persona_name, "First");
        assert_eq!(results[1].persona_name, "Second");
        assert_eq!(results[0].key_points, vec!["price", "design"]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_owned_hides_other_users_sessions(pool: PgPool) {
        let owner = create_test_user(&pool, 0).await;
        let other = create_test_user(&pool, 0).await;
        let session = make_session(&pool, owner.id, 1).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = FeedbackSessions::new(&mut conn);

        assert!(repo.get_owned(session.id, owner.id).await.unwrap().is_some());
        assert!(repo.get_owned(session.id, other.id).await.unwrap().is_none());
    }
}
