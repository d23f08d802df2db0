use axum::{extract::State, Json};

use crate::{
    api::models::{
        auth::{AuthResponse, AuthSuccessResponse, GoogleLoginRequest, LoginResponse, LogoutResponse},
        users::{CurrentUser, UserResponse},
    },
    auth::{google, session},
    db::{
        errors::DbError,
        handlers::{Ledger, Repository, Users},
        models::{
            credits::{LedgerEntryOptions, LedgerEntryType},
            users::UserCreateDBRequest,
        },
    },
    errors::Error,
    AppState,
};

/// Sign in with a Google ID token.
///
/// The account is created on first sign-in; when configured, initial credits
/// are granted at that moment (ledger-recorded as a signup grant).
#[utoipa::path(
    post,
    path = "/authentication/google",
    request_body = GoogleLoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid Google credential"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn google_login(State(state): State<AppState>, Json(request): Json<GoogleLoginRequest>) -> Result<LoginResponse, Error> {
    let profile = google::verify_id_token(&state.config, &request.credential).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let existing = Users::new(&mut tx).get_user_by_email(&profile.email).await?;
    let user = match existing {
        Some(user) => user,
        None => {
            let is_admin = state.config.admin_email.as_deref() == Some(profile.email.as_str());
            let created = Users::new(&mut tx)
                .create(&UserCreateDBRequest {
                    email: profile.email.clone(),
                    display_name: profile.display_name.clone(),
                    avatar_url: profile.avatar_url.clone(),
                    auth_source: "google".to_string(),
                    is_admin,
                })
                .await?;

            // Give initial credits to new accounts if configured
            let initial_credits = state.config.credits.initial_credits;
            if initial_credits > 0 {
                Ledger::new(&mut tx)
                    .credit(
                        created.id,
                        initial_credits,
                        &LedgerEntryOptions::new(LedgerEntryType::SignupGrant)
                            .with_description("Initial credits on account creation"),
                    )
                    .await?;
            }

            tracing::info!("Created account {} for {}", created.id, created.email);
            created
        }
    };

    Users::new(&mut tx).record_login(user.id).await?;
    // Reload so the response carries the post-grant balance and login stamp
    let user = Users::new(&mut tx).get_by_id(user.id).await?.ok_or(DbError::NotFound)?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let user_response = UserResponse::from(user);
    let current_user = CurrentUser::from(user_response.clone());
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: user_response,
            message: "Login successful".to_string(),
        },
        cookie,
    })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    // Create expired cookie to clear session
    let cookie = format!(
        "{}=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0",
        state.config.auth.session.cookie_name
    );

    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie,
    })
}

/// Helper function to create a session cookie
fn create_session_cookie(token: &str, config: &crate::config::Config) -> String {
    let session_config = &config.auth.session;
    let max_age = session_config.jwt_expiry.as_secs();

    format!(
        "{}={}; Path=/; HttpOnly; Secure={}; SameSite={}; Max-Age={}",
        session_config.cookie_name, token, session_config.cookie_secure, session_config.cookie_same_site, max_age
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config_with_packages;
    use axum_test::TestServer;
    use sqlx::PgPool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_google(pool: PgPool, mock: &MockServer, initial_credits: i64) -> TestServer {
        let mut config = test_config_with_packages();
        config.auth.google.client_id = "percepta-client-id".to_string();
        config.auth.google.tokeninfo_url = url::Url::parse(&format!("{}/tokeninfo", mock.uri())).unwrap();
        config.credits.initial_credits = initial_credits;

        let state = crate::test_utils::build_test_state(pool, config);
        let app = axum::Router::new()
            .route("/authentication/google", axum::routing::post(google_login))
            .route("/authentication/logout", axum::routing::post(logout))
            .with_state(state);
        TestServer::new(app).unwrap()
    }

    fn google_ok_response(email: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "aud": "percepta-client-id",
            "email": email,
            "email_verified": "true",
            "name": "A User",
            "picture": "https://example.com/a.png"
        }))
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_first_login_creates_account_with_initial_credits(pool: PgPool) {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .respond_with(google_ok_response("new@example.com"))
            .mount(&mock)
            .await;

        let server = server_with_google(pool.clone(), &mock, 10).await;

        let response = server
            .post("/authentication/google")
            .json(&GoogleLoginRequest {
                credential: "token".to_string(),
            })
            .await;

        response.assert_status_ok();
        assert!(response.headers().get("set-cookie").is_some());

        let body: AuthResponse = response.json();
        assert_eq!(body.user.email, "new@example.com");
        assert_eq!(body.user.credits, 10);
        assert!(body.user.last_login.is_some());

        // The grant is ledger-recorded
        let mut conn = pool.acquire().await.unwrap();
        let entries = crate::db::handlers::Ledger::new(&mut conn)
            .list_user_entries(body.user.id, 0, 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, LedgerEntryType::SignupGrant);
        assert_eq!(entries[0].amount, 10);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_second_login_does_not_regrant(pool: PgPool) {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .respond_with(google_ok_response("repeat@example.com"))
            .mount(&mock)
            .await;

        let server = server_with_google(pool, &mock, 10).await;

        let request = GoogleLoginRequest {
            credential: "token".to_string(),
        };
        server.post("/authentication/google").json(&request).await.assert_status_ok();
        let response = server.post("/authentication/google").json(&request).await;

        response.assert_status_ok();
        let body: AuthResponse = response.json();
        assert_eq!(body.user.credits, 10);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rejected_credential_is_401(pool: PgPool) {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tokeninfo"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_token"))
            .mount(&mock)
            .await;

        let server = server_with_google(pool, &mock, 0).await;

        let response = server
            .post("/authentication/google")
            .json(&GoogleLoginRequest {
                credential: "bad".to_string(),
            })
            .await;

        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }
}
