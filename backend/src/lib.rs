//! Planning Poker - real-time estimation sessions.
//!
//! A coordinator applies every session operation as a pure transition over
//! the stored record, persists only the field group it touched, and pushes
//! the committed record to subscribers. Clients keep a fresh view through a
//! propagation manager that falls back to polling when push goes quiet.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
