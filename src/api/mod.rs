//! API layer: request/response DTOs and axum handlers.

pub mod handlers;
pub mod models;
