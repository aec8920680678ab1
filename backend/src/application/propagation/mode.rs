//! Modes of the propagation manager.

use crate::domain::foundation::StateMachine;
use serde::Serialize;
use std::fmt;

/// Where a propagation manager gets its updates from.
///
/// ```text
/// Subscribing ──► PushActive ◄──► PollingFallback
///      │              │                 │
///      └──────────────┴──► Detached ◄───┘
/// ```
///
/// `Subscribing` can also drop straight to `PollingFallback` when the grace
/// window passes without a push. `Detached` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Subscribed (or subscribing) and waiting for the first push.
    Subscribing,
    /// Pushes are arriving; no polling.
    PushActive,
    /// Push is silent or broken; the session is being polled.
    PollingFallback,
    /// Torn down.
    Detached,
}

impl PropagationMode {
    /// Polling means push is not trusted right now.
    pub fn is_degraded(&self) -> bool {
        matches!(self, PropagationMode::PollingFallback)
    }
}

impl StateMachine for PropagationMode {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PropagationMode::*;
        matches!(
            (self, target),
            (Subscribing, PushActive)
                | (Subscribing, PollingFallback)
                | (Subscribing, Detached)
                | (PushActive, PollingFallback)
                | (PushActive, Detached)
                | (PollingFallback, PushActive)
                | (PollingFallback, Detached)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PropagationMode::*;
        match self {
            Subscribing => vec![PushActive, PollingFallback, Detached],
            PushActive => vec![PollingFallback, Detached],
            PollingFallback => vec![PushActive, Detached],
            Detached => vec![],
        }
    }
}

impl fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PropagationMode::Subscribing => "subscribing",
            PropagationMode::PushActive => "push_active",
            PropagationMode::PollingFallback => "polling_fallback",
            PropagationMode::Detached => "detached",
        };
        f.write_str(s)
    }
}
