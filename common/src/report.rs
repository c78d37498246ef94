//! Measurement result types and rendering

use serde::{Deserialize, Serialize};

use crate::score::QualitySummary;

/// Partially populated live metrics, updated independently as each phase
/// reports data. A field set once within a session is never cleared again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    pub download_bps: Option<f64>,
    pub upload_bps: Option<f64>,
    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
}

impl LiveMetrics {
    /// Merge a fresh snapshot, only overwriting fields the engine actually
    /// reported. A metric never regresses to blank because a different
    /// metric updated.
    pub fn merge(&mut self, snapshot: &LiveMetrics) {
        if snapshot.download_bps.is_some() {
            self.download_bps = snapshot.download_bps;
        }
        if snapshot.upload_bps.is_some() {
            self.upload_bps = snapshot.upload_bps;
        }
        if snapshot.latency_ms.is_some() {
            self.latency_ms = snapshot.latency_ms;
        }
        if snapshot.jitter_ms.is_some() {
            self.jitter_ms = snapshot.jitter_ms;
        }
    }
}

/// Results summary delivered by the measurement engine on finish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSummary {
    pub download_bandwidth: Option<f64>,
    pub upload_bandwidth: Option<f64>,
    pub latency: Option<f64>,
    pub jitter: Option<f64>,
}

/// Final report of a completed session. Produced exactly once, immutable
/// thereafter.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub download_bps: Option<f64>,
    pub upload_bps: Option<f64>,
    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    /// Packet loss ratio in [0, 1]. `None` means the loss probe did not
    /// run, which is distinct from a measured zero.
    pub packet_loss_ratio: Option<f64>,
    pub quality: QualitySummary,
}

impl FinalReport {
    pub fn from_summary(summary: &EngineSummary) -> Self {
        Self {
            download_bps: summary.download_bandwidth,
            upload_bps: summary.upload_bandwidth,
            latency_ms: summary.latency,
            jitter_ms: summary.jitter,
            packet_loss_ratio: None,
            quality: QualitySummary::unavailable(),
        }
    }

    pub fn download_text(&self) -> String {
        format_bandwidth(self.download_bps)
    }

    pub fn upload_text(&self) -> String {
        format_bandwidth(self.upload_bps)
    }

    pub fn latency_text(&self) -> String {
        format_millis(self.latency_ms)
    }

    pub fn jitter_text(&self) -> String {
        format_millis(self.jitter_ms)
    }

    pub fn packet_loss_text(&self) -> String {
        match self.packet_loss_ratio {
            Some(ratio) => format!("{:.2}%", ratio * 100.0),
            None => "N/A".to_string(),
        }
    }
}

/// Render bits-per-second as a fixed-precision Mbps string.
pub fn format_bandwidth(bps: Option<f64>) -> String {
    match bps {
        Some(bps) => format!("{:.2} Mbps", bps / 1e6),
        None => "N/A".to_string(),
    }
}

/// Render a millisecond value at one decimal place.
pub fn format_millis(ms: Option<f64>) -> String {
    match ms {
        Some(ms) => format!("{:.1} ms", ms),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_values_render_at_fixed_precision() {
        let summary = EngineSummary {
            download_bandwidth: Some(50_000_000.0),
            upload_bandwidth: Some(10_000_000.0),
            latency: Some(12.3),
            jitter: Some(1.1),
        };
        let report = FinalReport::from_summary(&summary);
        assert_eq!(report.download_text(), "50.00 Mbps");
        assert_eq!(report.upload_text(), "10.00 Mbps");
        assert_eq!(report.latency_text(), "12.3 ms");
        assert_eq!(report.jitter_text(), "1.1 ms");
    }

    #[test]
    fn absent_fields_render_as_placeholder() {
        let report = FinalReport::from_summary(&EngineSummary::default());
        assert_eq!(report.download_text(), "N/A");
        assert_eq!(report.latency_text(), "N/A");
        assert_eq!(report.packet_loss_text(), "N/A");
    }

    #[test]
    fn packet_loss_absence_is_distinct_from_zero() {
        let mut report = FinalReport::from_summary(&EngineSummary::default());
        assert_eq!(report.packet_loss_text(), "N/A");
        report.packet_loss_ratio = Some(0.0);
        assert_eq!(report.packet_loss_text(), "0.00%");
    }

    #[test]
    fn live_metrics_never_regress_to_blank() {
        let mut live = LiveMetrics {
            latency_ms: Some(14.0),
            ..Default::default()
        };
        // A download-only snapshot must not clear the latency field.
        live.merge(&LiveMetrics {
            download_bps: Some(80_000_000.0),
            ..Default::default()
        });
        assert_eq!(live.latency_ms, Some(14.0));
        assert_eq!(live.download_bps, Some(80_000_000.0));
    }

    #[test]
    fn live_metrics_update_with_fresh_values() {
        let mut live = LiveMetrics {
            download_bps: Some(10_000_000.0),
            ..Default::default()
        };
        live.merge(&LiveMetrics {
            download_bps: Some(20_000_000.0),
            ..Default::default()
        });
        assert_eq!(live.download_bps, Some(20_000_000.0));
    }
}
