//! Measurement engine seam
//!
//! The orchestrator drives an engine only through this surface: a
//! non-blocking start, a pause, result accessors, and an event stream.
//! It never assumes the engine's internal phase sequencing is
//! authoritative.

pub mod http;

use tokio::sync::mpsc;

use speedmark_common::report::{EngineSummary, LiveMetrics};
use speedmark_common::score::Scores;

/// Configuration handed to an engine at construction time.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The orchestrator always starts the engine explicitly.
    pub auto_start: bool,
    pub download_url: String,
    pub upload_url: String,
    pub measure_download_loaded_latency: bool,
    pub measure_upload_loaded_latency: bool,
    /// Present only when packet-loss measurement is enabled and a broker
    /// is configured; its absence skips the loss phase entirely.
    pub turn_credential_url: Option<String>,
}

/// Asynchronous signals delivered by a running engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A phase just reported fresh data; carries the phase identifier
    /// as the engine names it.
    ResultsChanged { phase_id: String },
    /// The engine finished on its own and produced a summary.
    Finished(EngineSummary),
    /// The engine failed mid-session.
    Failed(String),
}

pub trait Engine {
    /// Begin the measurement run. Returns immediately; results arrive
    /// through the event stream.
    fn play(&mut self) -> anyhow::Result<()>;

    /// Request the engine cease the run and further event delivery.
    fn pause(&mut self) -> anyhow::Result<()>;

    /// Snapshot of the engine's current partial metrics.
    fn results(&self) -> LiveMetrics;

    /// Packet loss ratio in [0, 1]; `None` when the loss probe did not
    /// run or has not completed.
    fn packet_loss(&self) -> Option<f64>;

    /// Per-activity quality scores, when the engine can produce them.
    fn scores(&self) -> Option<Scores>;

    /// Take the event stream. Yields `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<EngineEvent>>;
}
