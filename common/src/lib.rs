//! Speedmark Common Library
//!
//! Shared definitions for the Speedmark measurement pipeline: measurement
//! phases, report types, quality scoring, CORS origin resolution, and
//! relay URL filtering. Used by the client, the traffic server, and the
//! credential broker.

pub mod constants;
pub mod cors;
pub mod error;
pub mod phase;
pub mod report;
pub mod score;
pub mod turn;

pub use constants::*;
pub use error::SpeedmarkError;
