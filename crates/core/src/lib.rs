//! Shared types and pure domain logic for the Campo notification pipeline.
//!
//! Nothing in this crate performs I/O. The database layer, the push
//! transport and the worker all build on the types defined here.

pub mod backoff;
pub mod delivery;
pub mod error;
pub mod notification;
pub mod types;
