//! Authentication: Google sign-in, JWT sessions, and the [`CurrentUser`]
//! extractor.
//!
//! There is no password authentication. Accounts are created on first Google
//! sign-in; subsequent requests authenticate with the JWT session cookie (or
//! a `Bearer` token carrying the same JWT).
//!
//! [`CurrentUser`]: crate::api::models::users::CurrentUser

pub mod current_user;
pub mod google;
pub mod session;
