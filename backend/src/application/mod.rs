//! Application layer - orchestration over the domain and the ports.
//!
//! - `coordinator` - server-side entry points for every session operation
//! - `propagation` - client-side view maintenance with push/poll fallback

mod coordinator;
pub mod propagation;

pub use coordinator::{
    CoordinatorConfig, CreateSessionCommand, CreateSessionResult, CreatorCommand,
    JoinSessionCommand, JoinSessionResult, RoundStatistics, SessionCoordinator,
    SubmitVoteCommand,
};
pub use propagation::{
    PropagationConfig, PropagationHandle, PropagationManager, PropagationMode, PropagationStatus,
};
