//! Measurement phases and their progress mapping

/// One measurement stage within a session.
///
/// The engine reports phases by string identifier; unknown identifiers are
/// tolerated by callers (they map to no progress, not an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Latency,
    Download,
    Upload,
    PacketLoss,
}

impl Phase {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "latency" => Some(Phase::Latency),
            "download" => Some(Phase::Download),
            "upload" => Some(Phase::Upload),
            "packetLoss" => Some(Phase::PacketLoss),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Phase::Latency => "latency",
            Phase::Download => "download",
            Phase::Upload => "upload",
            Phase::PacketLoss => "packetLoss",
        }
    }

    /// Fixed progress percentage shown while this phase reports data.
    pub fn progress_percent(self) -> u8 {
        match self {
            Phase::Latency => 20,
            Phase::Download => 60,
            Phase::Upload => 80,
            Phase::PacketLoss => 90,
        }
    }

    pub fn status_text(self) -> &'static str {
        match self {
            Phase::Latency => "Measuring latency...",
            Phase::Download => "Testing download speed...",
            Phase::Upload => "Testing upload speed...",
            Phase::PacketLoss => "Checking packet loss...",
        }
    }
}

/// Status text shown for unrecognized phase identifiers.
pub const GENERIC_STATUS_TEXT: &str = "Running test...";
