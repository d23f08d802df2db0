//! Database request/response models, grouped by entity.

pub mod credits;
pub mod payments;
pub mod personas;
pub mod sessions;
pub mod users;
