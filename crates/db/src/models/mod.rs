//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and the DTO used to insert it.

pub mod notification_job;
pub mod push_subscription;
pub mod status;
