//! HTTP adapter for session endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    CreateSessionResponse, ErrorResponse, JoinSessionResponse, NicknameRequest,
    ParticipantRequest, StatisticsResponse, SuccessResponse, VoteRequest, VoteValue,
};
pub(crate) use handlers::handle_session_error;
pub use handlers::SessionHandlers;
pub use routes::session_routes;
