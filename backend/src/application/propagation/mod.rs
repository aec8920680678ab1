//! Client-side propagation of session state.
//!
//! A [`PropagationManager`] keeps one locally cached session view fresh
//! using push notifications with a polling fallback. See `manager.rs` for the
//! reconciliation rules and `mode.rs` for the mode state machine.

mod manager;
mod mode;

pub use manager::{PropagationConfig, PropagationHandle, PropagationManager, PropagationStatus};
pub use mode::PropagationMode;
