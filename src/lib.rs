//! # Percepta: persona-based content feedback with credit billing
//!
//! Percepta lets users define customer personas, submit content for
//! evaluation, and receive generated feedback simulating how each persona
//! would react. Usage is billed through a credit system backed by an
//! append-only ledger, topped up via a payment provider's hosted checkout
//! and webhooks.
//!
//! ## Overview
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for all persistence. There is no shared
//! in-process state between requests: all cross-request consistency comes
//! from row locks and transactions, so multiple stateless instances can run
//! against the same database.
//!
//! ### Core flows
//!
//! **Feedback sessions.** Creating a session validates the referenced
//! personas, then inserts the session row and debits the credit ledger in one
//! transaction. Generation runs one best-effort provider call per persona; a
//! persona that fails (lookup error, provider error, timeout) is skipped, and
//! a reconciliation step afterwards refunds exactly the failed portion. The
//! user never pays for a persona the system failed to evaluate.
//!
//! **Payments.** The payment provider delivers signed webhooks at-least-once.
//! Each delivery is verified (HMAC-SHA256 over the raw body, constant-time
//! comparison), parsed into a tagged event, and applied inside a single
//! transaction with a row-locked duplicate check per external order id -
//! concurrent duplicate deliveries credit the account exactly once.
//!
//! **Credit ledger.** Every balance change anywhere in the system goes
//! through the [`db::handlers::Ledger`] repository, which locks the account
//! row and appends exactly one audit entry per mutation in the same unit of
//! work. The live balance and the ledger can never diverge.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use percepta::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = percepta::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     percepta::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod ai;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod payment_providers;
pub mod telemetry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use bon::Builder;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, instrument, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{ai::FeedbackModel, openapi::ApiDoc, payment_providers::PaymentProvider};

pub use config::Config;
pub use types::{LedgerEntryId, PaymentId, PersonaId, SessionId, UserId};

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: PostgreSQL connection pool
/// - `config`: Application configuration loaded from file/environment
/// - `model`: The feedback model implementation
/// - `payment`: Optional payment provider (checkout + webhooks)
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub model: Arc<dyn FeedbackModel>,
    pub payment: Option<Arc<dyn PaymentProvider>>,
}

/// Get the percepta database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.cors;

    let mut cors = if cors_config.allowed_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(tower_http::cors::Any)
    } else {
        let origins = cors_config
            .allowed_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(cors_config.allow_credentials)
    };

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// - Authentication routes at the root (`/authentication/*`)
/// - The payment provider webhook at `/webhooks/payments` (external services,
///   not part of the client API docs)
/// - The client API under `/api/v1/*`
/// - API docs at `/docs`
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/google", post(api::handlers::auth::google_login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .with_state(state.clone());

    let api_routes = Router::new()
        // Accounts
        .route("/users", get(api::handlers::users::list_users))
        .route("/users/current", get(api::handlers::users::get_current_user))
        // Credits
        .route(
            "/users/current/credits/balance",
            get(api::handlers::credits::get_current_user_balance),
        )
        .route(
            "/users/current/credits/ledger",
            get(api::handlers::credits::list_current_user_ledger),
        )
        .route("/users/{user_id}/credits", post(api::handlers::credits::adjust_user_credits))
        .route(
            "/users/{user_id}/credits/balance",
            get(api::handlers::credits::get_user_balance),
        )
        .route("/credits/ledger", get(api::handlers::credits::list_all_ledger_entries))
        // Personas
        .route(
            "/personas",
            get(api::handlers::personas::list_personas).post(api::handlers::personas::create_persona),
        )
        .route("/personas/generate", post(api::handlers::personas::generate_personas))
        .route(
            "/personas/{id}",
            get(api::handlers::personas::get_persona)
                .patch(api::handlers::personas::update_persona)
                .delete(api::handlers::personas::delete_persona),
        )
        // Feedback sessions
        .route(
            "/sessions",
            get(api::handlers::feedback::list_sessions).post(api::handlers::feedback::create_session),
        )
        .route("/sessions/{id}", get(api::handlers::feedback::get_session))
        .route("/sessions/{id}/feedback", post(api::handlers::feedback::generate_feedback))
        .route("/sessions/{id}/summary", post(api::handlers::feedback::summarize_session))
        // Payments
        .route("/payments", get(api::handlers::payments::list_payments))
        .route("/payments/checkout", post(api::handlers::payments::create_checkout))
        .route("/payments/packages", get(api::handlers::payments::list_packages))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        // Webhook routes (external services, not part of client API docs)
        .route("/webhooks/payments", post(api::handlers::payments::webhook_handler))
        .with_state(state.clone())
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, and wires up the providers
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles requests
/// 3. **Shutdown**: on the shutdown signal, drains and closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;
        migrator().run(&pool).await?;

        let model: Arc<dyn FeedbackModel> = Arc::new(ai::openai::OpenAiModel::new(&config.ai));
        let payment = payment_providers::create_provider(&config);

        if payment.is_none() {
            info!("No payment provider configured; checkout and webhooks are disabled");
        }

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .model(model)
            .maybe_payment(payment)
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Percepta listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
