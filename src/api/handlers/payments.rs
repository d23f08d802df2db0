//! HTTP handlers for payment endpoints: checkout, package listing, payment
//! history, and the provider webhook.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    api::models::{
        payments::{CheckoutCreate, CheckoutResponse, ListPaymentsQuery, PackageResponse, PaymentResponse},
        users::CurrentUser,
    },
    db::handlers::Payments,
    errors::{Error, Result},
    AppState,
};

/// List purchasable credit packages
#[utoipa::path(
    get,
    path = "/payments/packages",
    tag = "payments",
    responses(
        (status = 200, description = "Configured packages", body = [PackageResponse]),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_packages(State(state): State<AppState>) -> Result<Json<Vec<PackageResponse>>> {
    Ok(Json(state.config.packages.iter().map(PackageResponse::from).collect()))
}

/// Request a hosted-checkout URL for a package.
///
/// The caller's account id travels as custom metadata so the provider's
/// webhook can attribute the eventual order.
#[utoipa::path(
    post,
    path = "/payments/checkout",
    tag = "payments",
    request_body = CheckoutCreate,
    responses(
        (status = 200, description = "Checkout URL to navigate to", body = CheckoutResponse),
        (status = 400, description = "Unknown package"),
        (status = 401, description = "Unauthorized"),
        (status = 501, description = "No payment provider configured"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CheckoutCreate>,
) -> Result<Response> {
    let Some(provider) = state.payment.as_ref() else {
        tracing::warn!("Checkout requested but no payment provider is configured");
        let error_response = Json(json!({
            "error": "No payment provider configured",
            "message": "Sorry, there's no payment provider setup. Please contact support."
        }));
        return Ok((StatusCode::NOT_IMPLEMENTED, error_response).into_response());
    };

    let package = state.config.package_by_name(&request.package).ok_or_else(|| Error::BadRequest {
        message: format!("Unknown package '{}'", request.package),
    })?;

    let url = provider.checkout_url(package, current_user.id)?;

    tracing::info!("Issued checkout URL for package {} to user {}", package.name, current_user.id);

    Ok(Json(CheckoutResponse { url: url.to_string() }).into_response())
}

/// List the caller's payment records
#[utoipa::path(
    get,
    path = "/payments",
    tag = "payments",
    params(ListPaymentsQuery),
    responses(
        (status = 200, description = "Payment records, newest first", body = [PaymentResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_payments(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<PaymentResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let records = Payments::new(&mut conn).list_for_user(current_user.id, skip, limit).await?;

    Ok(Json(records.into_iter().map(PaymentResponse::from).collect()))
}

/// Payment provider webhook.
///
/// The signature is verified over the raw body before anything else. Events
/// are applied exactly once per external order; duplicates acknowledge with
/// 2xx and no side effects. Processing failures return non-2xx so the
/// provider redelivers.
#[tracing::instrument(skip_all)]
pub async fn webhook_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<StatusCode> {
    let Some(provider) = state.payment.as_ref() else {
        tracing::warn!("Payment webhook called but no payment provider is configured");
        return Ok(StatusCode::NOT_IMPLEMENTED);
    };

    let event = provider.parse_webhook(&headers, &body).map_err(Error::from)?;

    tracing::info!("Received webhook event: {event:?}");

    provider
        .process_event(&state.db, &state.config, &event)
        .await
        .map_err(Error::from)?;

    Ok(StatusCode::OK)
}
