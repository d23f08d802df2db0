//! Common type definitions shared across the crate.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: account identifier
//! - [`PersonaId`]: customer persona identifier
//! - [`SessionId`]: feedback session identifier
//! - [`LedgerEntryId`]: credit ledger entry identifier
//! - [`PaymentId`]: payment record identifier

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type PersonaId = Uuid;
pub type SessionId = Uuid;
pub type LedgerEntryId = Uuid;
pub type PaymentId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
