//! The [`CurrentUser`] axum extractor.
//!
//! Authentication methods are tried in priority order:
//! 1. JWT session cookie (browser clients)
//! 2. `Authorization: Bearer <jwt>` header (API clients)
//!
//! [`CurrentUser`]: crate::api::models::users::CurrentUser

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

use crate::{
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
    AppState,
};

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No session cookie present, or it fails verification (expired
///   cookies are expected, not errors)
/// - Some(user): Valid JWT found and verified
#[instrument(skip(parts, config))]
fn try_jwt_session_auth(parts: &Parts, config: &crate::config::Config) -> Option<CurrentUser> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;
    let cookie_name = &config.auth.session.cookie_name;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name == cookie_name {
                match session::verify_session_token(value, config) {
                    Ok(user) => return Some(user),
                    Err(_) => continue,
                }
            }
        }
    }
    None
}

/// Extract user from a Bearer token carrying a session JWT
#[instrument(skip(parts, config))]
fn try_bearer_auth(parts: &Parts, config: &crate::config::Config) -> Option<CurrentUser> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?;
    session::verify_session_token(token, config).ok()
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(user) = try_jwt_session_auth(parts, &state.config) {
            trace!("Authenticated via session cookie");
            return Ok(user);
        }

        if let Some(user) = try_bearer_auth(parts, &state.config) {
            trace!("Authenticated via bearer token");
            return Ok(user);
        }

        Err(Error::Unauthenticated { message: None })
    }
}

impl CurrentUser {
    /// Guard for admin-only handlers
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(Error::Forbidden {
                message: "Administrator access required".to_string(),
            })
        }
    }
}
