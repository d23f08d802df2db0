//! Repository implementations for database access.
//!
//! This module provides repository structs for each major entity in the system.
//! Repositories follow a consistent pattern:
//!
//! - Wrap a SQLx connection or transaction
//! - Provide strongly-typed operations
//! - Handle query construction and parameter binding
//! - Return domain models from [`crate::db::models`]
//! - Use the connection's transaction for ACID guarantees
//!
//! # Available Repositories
//!
//! - [`Users`]: account management
//! - [`Ledger`]: credit balance mutation and audit trail
//! - [`Personas`]: customer persona definitions
//! - [`FeedbackSessions`]: feedback sessions and per-persona results
//! - [`Payments`]: payment records from the payment provider
//!
//! # Common Pattern
//!
//! ```ignore
//! use percepta::db::handlers::{Users, Repository};
//!
//! async fn example(pool: &sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tx = pool.begin().await?;
//!     let mut repo = Users::new(&mut tx);
//!     let user = repo.get_user_by_email("someone@example.com").await?;
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! The [`Ledger`] repository is the single gate for balance mutations: every
//! credit change in the crate goes through [`Ledger::debit`] or
//! [`Ledger::credit`], which take a row lock on the account before the
//! read-decide-write sequence.

pub mod credits;
pub mod payments;
pub mod personas;
pub mod repository;
pub mod sessions;
pub mod users;

pub use credits::Ledger;
pub use payments::Payments;
pub use personas::Personas;
pub use repository::Repository;
pub use sessions::FeedbackSessions;
pub use users::Users;
