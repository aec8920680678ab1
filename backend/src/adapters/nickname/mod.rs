//! Nickname generator adapters.

mod random;

pub use random::RandomNicknameGenerator;
