//! Axum handlers, grouped by resource.

pub mod auth;
pub mod credits;
pub mod feedback;
pub mod payments;
pub mod personas;
pub mod users;
