use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::models::{
        credits::{BalanceResponse, CreditAdjustmentCreate, LedgerEntryResponse, ListLedgerQuery},
        users::CurrentUser,
    },
    db::{
        handlers::Ledger,
        models::credits::{LedgerEntryOptions, LedgerEntryType},
    },
    errors::{Error, Result},
    types::UserId,
    AppState,
};

/// Get current user's credit balance
#[utoipa::path(
    get,
    path = "/users/current/credits/balance",
    tag = "credits",
    responses(
        (status = 200, description = "User's current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user_balance(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<BalanceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let credits = Ledger::new(&mut conn).balance(current_user.id).await?;

    Ok(Json(BalanceResponse {
        user_id: current_user.id,
        credits,
    }))
}

/// List current user's ledger history
#[utoipa::path(
    get,
    path = "/users/current/credits/ledger",
    tag = "credits",
    params(ListLedgerQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = [LedgerEntryResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_current_user_ledger(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListLedgerQuery>,
) -> Result<Json<Vec<LedgerEntryResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let entries = Ledger::new(&mut conn).list_user_entries(current_user.id, skip, limit).await?;

    Ok(Json(entries.into_iter().map(LedgerEntryResponse::from).collect()))
}

/// List ledger entries across all users (admin only)
#[utoipa::path(
    get,
    path = "/credits/ledger",
    tag = "credits",
    params(ListLedgerQuery),
    responses(
        (status = 200, description = "Ledger entries across all users, newest first", body = [LedgerEntryResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_all_ledger_entries(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListLedgerQuery>,
) -> Result<Json<Vec<LedgerEntryResponse>>> {
    current_user.require_admin()?;

    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let entries = Ledger::new(&mut conn).list_all_entries(skip, limit).await?;

    Ok(Json(entries.into_iter().map(LedgerEntryResponse::from).collect()))
}

/// Adjust a user's balance (admin only)
#[utoipa::path(
    post,
    path = "/users/{user_id}/credits",
    tag = "credits",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    request_body = CreditAdjustmentCreate,
    responses(
        (status = 201, description = "Adjustment recorded", body = LedgerEntryResponse),
        (status = 400, description = "Bad request - invalid entry type or amount"),
        (status = 401, description = "Unauthorized"),
        (status = 402, description = "Removal exceeds the user's balance"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "User not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn adjust_user_credits(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    Json(data): Json<CreditAdjustmentCreate>,
) -> Result<(StatusCode, Json<LedgerEntryResponse>)> {
    current_user.require_admin()?;

    // Only the two admin entry types may be created through this endpoint
    if !matches!(data.entry_type, LedgerEntryType::AdminGrant | LedgerEntryType::AdminRemoval) {
        return Err(Error::BadRequest {
            message: "Only 'admin_grant' and 'admin_removal' entry types are allowed for this endpoint".to_string(),
        });
    }

    if data.amount <= 0 {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }

    let opts = LedgerEntryOptions {
        reference_id: Some(current_user.id.to_string()),
        reference_type: Some("admin".to_string()),
        description: data.description.clone(),
        ..LedgerEntryOptions::new(data.entry_type.clone())
    }
    .with_metadata(serde_json::json!({ "actor_email": current_user.email }));

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut ledger = Ledger::new(&mut conn);

    let entry = match data.entry_type {
        LedgerEntryType::AdminGrant => ledger.credit(user_id, data.amount, &opts).await?,
        LedgerEntryType::AdminRemoval => ledger.debit(user_id, data.amount, &opts).await?,
        _ => unreachable!(), // Already validated above
    };

    Ok((StatusCode::CREATED, Json(LedgerEntryResponse::from(entry))))
}

/// Get a specific user's balance (admin only)
#[utoipa::path(
    get,
    path = "/users/{user_id}/credits/balance",
    tag = "credits",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "User's current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin only"),
        (status = 404, description = "User not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
) -> Result<Json<BalanceResponse>> {
    current_user.require_admin()?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let credits = Ledger::new(&mut conn).balance(user_id).await?;

    Ok(Json(BalanceResponse { user_id, credits }))
}
