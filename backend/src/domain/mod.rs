//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (identifiers, timestamps, error codes)
//! - `session` - Session model, state machine, patches and statistics

pub mod foundation;
pub mod session;
