//! Measurement session orchestration
//!
//! Drives one session end-to-end, reconciling asynchronous phase,
//! completion, and error signals from the engine into a coherent,
//! observable session. States form an explicit tagged union with guarded
//! transitions; a session transitions monotonically and is replaced, not
//! resumed, by the next start.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use speedmark_common::constants::{DOWNLOAD_PATH, UPLOAD_PATH};
use speedmark_common::phase::{GENERIC_STATUS_TEXT, Phase};
use speedmark_common::report::{FinalReport, LiveMetrics};
use speedmark_common::score::QualitySummary;

use crate::config::Config;
use crate::engine::{Engine, EngineConfig, EngineEvent};

/// Delay between freezing progress at 100% and revealing the final
/// report, so the completion message can be perceived.
const FINISH_DISPLAY_DELAY: std::time::Duration = std::time::Duration::from_millis(1000);

/// Hard ceiling on a session; an engine that never signals finish or
/// error cannot keep the session `Running` forever.
pub const SESSION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

pub const CONFIG_ERROR_TEXT: &str =
    "No speedtest server URL configured. Set one with --server or save it to the config file.";
pub const TIMEOUT_ERROR_TEXT: &str = "The speed test timed out. Please try again.";
pub const GENERIC_ERROR_TEXT: &str =
    "An error occurred during the speed test. Please try again.";
pub const STOPPED_TEXT: &str = "Test stopped by user";
pub const COMPLETED_TEXT: &str = "Test completed!";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Running { phase: Option<Phase> },
    Stopped,
    Completed,
    Errored { message: String },
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Stopped | SessionState::Completed | SessionState::Errored { .. }
        )
    }
}

/// Progress display model: a percentage and a status line.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: u8,
    pub message: String,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            percent: 0,
            message: String::new(),
        }
    }
}

pub struct Orchestrator<E, F>
where
    E: Engine,
    F: Fn(EngineConfig) -> anyhow::Result<E>,
{
    config: Config,
    build_engine: F,
    engine: Option<E>,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    live: LiveMetrics,
    progress: Progress,
    report: Option<FinalReport>,
}

impl<E, F> Orchestrator<E, F>
where
    E: Engine,
    F: Fn(EngineConfig) -> anyhow::Result<E>,
{
    pub fn new(config: Config, build_engine: F) -> Self {
        Self {
            config,
            build_engine,
            engine: None,
            state: SessionState::Idle,
            started_at: None,
            live: LiveMetrics::default(),
            progress: Progress::default(),
            report: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn live(&self) -> &LiveMetrics {
        &self.live
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn report(&self) -> Option<&FinalReport> {
        self.report.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Begin a new session. A start while already running is an
    /// idempotent no-op. Returns the engine's event stream when a run
    /// actually began.
    pub fn start(&mut self) -> Option<mpsc::UnboundedReceiver<EngineEvent>> {
        if self.state.is_running() {
            debug!("start ignored: session already running");
            return None;
        }

        // Pre-flight validation happens before the engine exists at all.
        if self.config.server_base_url.trim().is_empty() {
            self.state = SessionState::Errored {
                message: CONFIG_ERROR_TEXT.to_string(),
            };
            return None;
        }

        // Fresh session: previous live/final state is discarded.
        self.live = LiveMetrics::default();
        self.report = None;
        self.progress = Progress {
            percent: 0,
            message: "Initializing test...".to_string(),
        };
        self.started_at = Some(Utc::now());

        let engine_config = self.engine_config();
        let mut engine = match (self.build_engine)(engine_config) {
            Ok(engine) => engine,
            Err(e) => {
                self.state = SessionState::Errored {
                    message: e.to_string(),
                };
                return None;
            }
        };

        let events = engine.take_events();
        if let Err(e) = engine.play() {
            self.state = SessionState::Errored {
                message: e.to_string(),
            };
            return None;
        }

        self.engine = Some(engine);
        self.state = SessionState::Running { phase: None };
        info!("measurement session started");
        events
    }

    fn engine_config(&self) -> EngineConfig {
        let base = self.config.server_base_url.trim().trim_end_matches('/');
        // The loss phase is skipped, not merely disabled, unless a broker
        // is configured and the toggle is on.
        let turn_credential_url = if self.config.enable_packet_loss {
            self.config
                .turn_credential_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        EngineConfig {
            auto_start: false,
            download_url: format!("{base}{DOWNLOAD_PATH}"),
            upload_url: format!("{base}{UPLOAD_PATH}"),
            measure_download_loaded_latency: self.config.enable_loaded_latency,
            measure_upload_loaded_latency: self.config.enable_loaded_latency,
            turn_credential_url,
        }
    }

    pub async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ResultsChanged { phase_id } => self.on_results_changed(&phase_id),
            EngineEvent::Finished(summary) => self.on_finish(summary).await,
            EngineEvent::Failed(message) => self.on_error(message),
        }
    }

    fn on_results_changed(&mut self, phase_id: &str) {
        if !self.state.is_running() {
            return;
        }

        // Re-read the engine's partial metrics; only reported values
        // overwrite, so nothing regresses to blank.
        if let Some(engine) = &self.engine {
            let snapshot = engine.results();
            self.live.merge(&snapshot);
        }

        // Unrecognized phases leave the progress bar unmoved rather than
        // failing the session.
        let phase = Phase::from_id(phase_id);
        self.progress = match phase {
            Some(phase) => Progress {
                percent: phase.progress_percent(),
                message: phase.status_text().to_string(),
            },
            None => Progress {
                percent: 0,
                message: GENERIC_STATUS_TEXT.to_string(),
            },
        };
        self.state = SessionState::Running { phase };
    }

    async fn on_finish(&mut self, summary: speedmark_common::report::EngineSummary) {
        if !self.state.is_running() {
            return;
        }

        self.state = SessionState::Completed;
        self.progress = Progress {
            percent: 100,
            message: COMPLETED_TEXT.to_string(),
        };

        // Let the completion message be perceived before the report
        // replaces it.
        tokio::time::sleep(FINISH_DISPLAY_DELAY).await;

        let mut report = FinalReport::from_summary(&summary);
        if let Some(engine) = &self.engine {
            // Loss is read separately: it may legitimately be absent,
            // which is distinct from a measured zero.
            report.packet_loss_ratio = engine.packet_loss();
            // Scoring is best-effort; absence is not a session error.
            report.quality = match engine.scores() {
                Some(scores) => QualitySummary::from_scores(&scores),
                None => QualitySummary::unavailable(),
            };
        }
        self.report = Some(report);
        info!("measurement session completed");
    }

    fn on_error(&mut self, message: String) {
        if !self.state.is_running() {
            return;
        }
        let message = if message.trim().is_empty() {
            GENERIC_ERROR_TEXT.to_string()
        } else {
            message
        };
        self.live = LiveMetrics::default();
        self.progress = Progress::default();
        self.state = SessionState::Errored { message };
    }

    /// Expire a session that outlived [`SESSION_TIMEOUT`]. The engine is
    /// paused best-effort; the session errors regardless.
    pub fn on_timeout(&mut self) {
        if !self.state.is_running() {
            return;
        }
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.pause() {
                debug!("engine pause on timeout failed: {}", e);
            }
        }
        self.on_error(TIMEOUT_ERROR_TEXT.to_string());
    }

    /// Cooperative cancellation. Valid only from `Running`; a failing
    /// engine pause moves the session to `Errored` instead.
    pub fn stop(&mut self) {
        if !self.state.is_running() {
            debug!("stop ignored: session not running");
            return;
        }

        let pause_result = match self.engine.as_mut() {
            Some(engine) => engine.pause(),
            None => Ok(()),
        };

        match pause_result {
            Ok(()) => {
                self.progress = Progress {
                    percent: self.progress.percent,
                    message: STOPPED_TEXT.to_string(),
                };
                self.state = SessionState::Stopped;
                info!("measurement session stopped by user");
            }
            Err(e) => {
                self.state = SessionState::Errored {
                    message: format!("Failed to stop the test properly: {e}"),
                };
            }
        }
    }

    /// Shareable plain-text summary. Available from `Completed` only.
    pub fn share_text(&self) -> Option<String> {
        if self.state != SessionState::Completed {
            return None;
        }
        self.report.as_ref().map(crate::output::share_text)
    }
}
