//! Feedback session flow: create (validate + debit), generate (best-effort
//! per-persona calls + refund reconciliation), summarize, and reads.
//!
//! Billing rule: credits track delivered value, not requested value. A
//! persona the system fails to evaluate - lookup failure, provider error, or
//! timeout - is refunded, never charged.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::models::{
        feedback::{
            FeedbackResultResponse, GenerateFeedbackRequest, ListSessionsQuery, SessionCreate, SessionResponse,
            SessionWithResultsResponse,
        },
        users::CurrentUser,
    },
    db::{
        handlers::{FeedbackSessions, Ledger, Personas, Repository},
        models::{
            credits::{LedgerEntryOptions, LedgerEntryType},
            sessions::{ResultCreateDBRequest, SessionCreateDBRequest, SessionStatus},
        },
    },
    errors::{Error, Result},
    types::{PersonaId, SessionId},
    AppState,
};

/// Create a feedback session.
///
/// Validates that every referenced persona exists and belongs to the caller,
/// then inserts the session and debits the ledger in one transaction: a
/// session can never exist without its debit, and an insufficient balance
/// rolls the session back.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "feedback",
    request_body = SessionCreate,
    responses(
        (status = 201, description = "Session created and billed", body = SessionResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "A referenced persona does not exist"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<SessionCreate>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    if request.persona_ids.is_empty() {
        return Err(Error::BadRequest {
            message: "At least one persona is required".to_string(),
        });
    }

    let mut unique = request.persona_ids.clone();
    unique.sort();
    unique.dedup();
    if unique.len() != request.persona_ids.len() {
        return Err(Error::BadRequest {
            message: "persona_ids must not contain duplicates".to_string(),
        });
    }

    let credits_needed = request.persona_ids.len() as i64 * state.config.credits.cost_per_persona;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // Every referenced persona must exist and be owned by the caller;
    // otherwise nothing is created
    let found = Personas::new(&mut tx).get_bulk(request.persona_ids.clone()).await?;
    for persona_id in &request.persona_ids {
        match found.get(persona_id) {
            Some(p) if p.user_id == current_user.id => {}
            _ => {
                return Err(Error::NotFound {
                    resource: "Persona".to_string(),
                    id: persona_id.to_string(),
                })
            }
        }
    }

    let session = FeedbackSessions::new(&mut tx)
        .create(&SessionCreateDBRequest {
            user_id: current_user.id,
            input_type: request.input_type,
            input_content: request.input_content,
            credits_used: credits_needed,
        })
        .await?;

    Ledger::new(&mut tx)
        .debit(
            current_user.id,
            credits_needed,
            &LedgerEntryOptions::for_session(LedgerEntryType::FeedbackSpend, session.id)
                .with_description(format!("Feedback session for {} personas", request.persona_ids.len())),
        )
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// Run feedback generation for a session against a set of target personas.
///
/// Personas are evaluated sequentially; a single persona's failure never
/// aborts the batch. After the loop, failed evaluations are refunded and the
/// session lands on `completed` (at least one result) or `failed` (none).
#[utoipa::path(
    post,
    path = "/sessions/{id}/feedback",
    tag = "feedback",
    params(("id" = String, Path, description = "Session ID (UUID)")),
    request_body = GenerateFeedbackRequest,
    responses(
        (status = 200, description = "Results for the personas that succeeded", body = SessionWithResultsResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Session not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(session_id = %id))]
pub async fn generate_feedback(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<SessionId>,
    Json(request): Json<GenerateFeedbackRequest>,
) -> Result<Json<SessionWithResultsResponse>> {
    if request.persona_ids.is_empty() {
        return Err(Error::BadRequest {
            message: "At least one persona is required".to_string(),
        });
    }

    let session = {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let session = FeedbackSessions::new(&mut conn)
            .get_owned(id, current_user.id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Session".to_string(),
                id: id.to_string(),
            })?;
        FeedbackSessions::new(&mut conn).set_status(session.id, SessionStatus::Processing).await?
    };

    // Sequential, best-effort loop. The pool connection is not held across
    // provider calls.
    let mut results = Vec::new();
    let mut failed_count: i64 = 0;
    for persona_id in &request.persona_ids {
        match evaluate_persona(&state, &session.input_content, session.id, *persona_id, &current_user).await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::warn!("Persona {persona_id} failed in session {id}: {e:#}");
                failed_count += 1;
            }
        }
    }

    let session = reconcile(&state, session.id, &current_user, failed_count, results.is_empty()).await?;

    Ok(Json(SessionWithResultsResponse {
        session: SessionResponse::from(session),
        results: results.into_iter().map(FeedbackResultResponse::from).collect(),
    }))
}

/// One persona's evaluation: lookup, provider call, result insert. Any error
/// here is counted as a per-persona failure by the caller.
async fn evaluate_persona(
    state: &AppState,
    content: &str,
    session_id: SessionId,
    persona_id: PersonaId,
    current_user: &CurrentUser,
) -> anyhow::Result<crate::db::models::sessions::ResultDBResponse> {
    let persona = {
        let mut conn = state.db.acquire().await?;
        Personas::new(&mut conn)
            .get_owned(persona_id, current_user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("persona not found or not owned"))?
    };

    let feedback = state.model.generate_feedback(content, &persona).await?;

    let mut conn = state.db.acquire().await?;
    let result = FeedbackSessions::new(&mut conn)
        .add_result(&ResultCreateDBRequest {
            session_id,
            persona_id,
            persona_name: persona.name,
            feedback_text: feedback.feedback_text,
            sentiment: feedback.sentiment,
            purchase_intent: feedback.purchase_intent,
            key_points: feedback.key_points,
            score: feedback.score,
        })
        .await?;

    Ok(result)
}

/// Post-loop reconciliation, in one transaction: refund the failures, reduce
/// the session's committed spend by the same amount, and set the final
/// status.
async fn reconcile(
    state: &AppState,
    session_id: SessionId,
    current_user: &CurrentUser,
    failed_count: i64,
    no_results: bool,
) -> Result<crate::db::models::sessions::SessionDBResponse> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if failed_count > 0 {
        let session = FeedbackSessions::new(&mut tx).get_by_id(session_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Session".to_string(),
            id: session_id.to_string(),
        })?;

        // Never refund more than the session still has committed
        let refund = (failed_count * state.config.credits.cost_per_persona).min(session.credits_used);
        if refund > 0 {
            Ledger::new(&mut tx)
                .credit(
                    current_user.id,
                    refund,
                    &LedgerEntryOptions::for_session(LedgerEntryType::RefundFeedbackPartial, session_id)
                        .with_description(format!("Refund for {failed_count} failed persona evaluations")),
                )
                .await?;
            FeedbackSessions::new(&mut tx).decrement_credits_used(session_id, refund).await?;
        }
    }

    let final_status = if no_results { SessionStatus::Failed } else { SessionStatus::Completed };
    let session = FeedbackSessions::new(&mut tx).set_status(session_id, final_status).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(session)
}

/// Summarize a session's collected results.
///
/// Re-running overwrites the stored summary. Unlike per-persona generation,
/// summarization has no partial-success concept: a provider failure fails the
/// request.
#[utoipa::path(
    post,
    path = "/sessions/{id}/summary",
    tag = "feedback",
    params(("id" = String, Path, description = "Session ID (UUID)")),
    responses(
        (status = 200, description = "Session with the new summary", body = SessionResponse),
        (status = 400, description = "No results to summarize"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Session not found"),
        (status = 502, description = "Feedback model failure"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(session_id = %id))]
pub async fn summarize_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionResponse>> {
    let (session, results) = {
        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let session = FeedbackSessions::new(&mut conn)
            .get_owned(id, current_user.id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "Session".to_string(),
                id: id.to_string(),
            })?;
        let results = FeedbackSessions::new(&mut conn).list_results(id).await?;
        (session, results)
    };

    if results.is_empty() {
        return Err(Error::BadRequest {
            message: "No results to summarize".to_string(),
        });
    }

    let summary = state
        .model
        .generate_summary(&session.input_content, &results)
        .await
        .map_err(|e| {
            tracing::error!("Summarization failed for session {id}: {e}");
            Error::Provider {
                operation: "summarize feedback results".to_string(),
            }
        })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let session = FeedbackSessions::new(&mut conn).set_summary(id, &summary).await?;

    Ok(Json(SessionResponse::from(session)))
}

/// Get a session with its results
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "feedback",
    params(("id" = String, Path, description = "Session ID (UUID)")),
    responses(
        (status = 200, description = "The session and its results", body = SessionWithResultsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Session not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_session(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionWithResultsResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let session = FeedbackSessions::new(&mut conn)
        .get_owned(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Session".to_string(),
            id: id.to_string(),
        })?;
    let results = FeedbackSessions::new(&mut conn).list_results(id).await?;

    Ok(Json(SessionWithResultsResponse {
        session: SessionResponse::from(session),
        results: results.into_iter().map(FeedbackResultResponse::from).collect(),
    }))
}

/// List the caller's sessions
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "feedback",
    params(ListSessionsQuery),
    responses(
        (status = 200, description = "Sessions, newest first", body = [SessionResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_sessions(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let sessions = FeedbackSessions::new(&mut conn).list_for_user(current_user.id, skip, limit).await?;

    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}
