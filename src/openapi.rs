//! OpenAPI documentation assembly.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::auth::google_login,
        crate::api::handlers::auth::logout,
        crate::api::handlers::users::get_current_user,
        crate::api::handlers::users::list_users,
        crate::api::handlers::credits::get_current_user_balance,
        crate::api::handlers::credits::list_current_user_ledger,
        crate::api::handlers::credits::list_all_ledger_entries,
        crate::api::handlers::credits::adjust_user_credits,
        crate::api::handlers::credits::get_user_balance,
        crate::api::handlers::personas::create_persona,
        crate::api::handlers::personas::list_personas,
        crate::api::handlers::personas::get_persona,
        crate::api::handlers::personas::update_persona,
        crate::api::handlers::personas::delete_persona,
        crate::api::handlers::personas::generate_personas,
        crate::api::handlers::feedback::create_session,
        crate::api::handlers::feedback::generate_feedback,
        crate::api::handlers::feedback::summarize_session,
        crate::api::handlers::feedback::get_session,
        crate::api::handlers::feedback::list_sessions,
        crate::api::handlers::payments::list_packages,
        crate::api::handlers::payments::create_checkout,
        crate::api::handlers::payments::list_payments,
    ),
    components(schemas(
        crate::api::models::auth::GoogleLoginRequest,
        crate::api::models::auth::AuthResponse,
        crate::api::models::auth::AuthSuccessResponse,
        crate::api::models::users::UserResponse,
        crate::api::models::credits::CreditAdjustmentCreate,
        crate::api::models::credits::LedgerEntryResponse,
        crate::api::models::credits::BalanceResponse,
        crate::api::models::personas::PersonaCreate,
        crate::api::models::personas::PersonaUpdate,
        crate::api::models::personas::GeneratePersonasRequest,
        crate::api::models::personas::PersonaResponse,
        crate::api::models::feedback::SessionCreate,
        crate::api::models::feedback::GenerateFeedbackRequest,
        crate::api::models::feedback::SessionResponse,
        crate::api::models::feedback::FeedbackResultResponse,
        crate::api::models::feedback::SessionWithResultsResponse,
        crate::api::models::payments::CheckoutCreate,
        crate::api::models::payments::CheckoutResponse,
        crate::api::models::payments::PaymentResponse,
        crate::api::models::payments::PackageResponse,
        crate::db::models::credits::LedgerEntryType,
        crate::db::models::sessions::InputType,
        crate::db::models::sessions::SessionStatus,
        crate::db::models::sessions::Sentiment,
        crate::db::models::sessions::PurchaseIntent,
        crate::db::models::payments::PaymentStatus,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "authentication", description = "Google sign-in and sessions"),
        (name = "users", description = "Account profiles"),
        (name = "credits", description = "Credit balances and ledger history"),
        (name = "personas", description = "Customer persona management"),
        (name = "feedback", description = "Feedback sessions and generation"),
        (name = "payments", description = "Credit purchases"),
    ),
    info(
        title = "Percepta API",
        description = "Persona-based content feedback with credit billing"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "BearerAuth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
            components.add_security_scheme(
                "CookieAuth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("percepta_session"))),
            );
        }
    }
}
