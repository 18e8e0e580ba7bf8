//! Circuit Tutor · exercise session backend.
//!
//! Requests generated circuit exercises from an external generator, keeps a navigable
//! per-session history, and grades numeric answers with a 5% relative tolerance.

pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod history;
pub mod protocol;
pub mod resolver;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod util;
pub mod verifier;
