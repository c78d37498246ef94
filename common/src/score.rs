//! Quality scoring
//!
//! The engine may expose 0-100 scores per activity class (streaming,
//! gaming, real-time communication). The report picks one in priority
//! order and maps it onto five descriptive tiers. Score capability is
//! best-effort: its absence is not a session error.

use serde::{Deserialize, Serialize};

/// Per-activity quality scores as reported by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scores {
    pub streaming: Option<f64>,
    pub gaming: Option<f64>,
    pub rtc: Option<f64>,
}

impl Scores {
    /// Pick the headline score: streaming, else gaming, else rtc.
    pub fn overall(&self) -> Option<f64> {
        self.streaming.or(self.gaming).or(self.rtc)
    }
}

/// The quality portion of a final report.
#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    pub score: Option<f64>,
    pub description: &'static str,
}

impl QualitySummary {
    pub fn from_scores(scores: &Scores) -> Self {
        let score = scores.overall();
        Self {
            score,
            description: describe(score),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            score: None,
            description: describe(None),
        }
    }

    /// Badge text: the numeric score, or the placeholder.
    pub fn badge(&self) -> String {
        match self.score {
            Some(score) => format!("{:.0}", score),
            None => "N/A".to_string(),
        }
    }
}

/// Map a score onto its descriptive tier.
pub fn describe(score: Option<f64>) -> &'static str {
    let Some(score) = score else {
        return "Network quality analysis unavailable";
    };

    if score >= 80.0 {
        "Excellent connection - Perfect for streaming, gaming, and video calls"
    } else if score >= 60.0 {
        "Good connection - Great for most online activities"
    } else if score >= 40.0 {
        "Fair connection - Suitable for basic browsing and emails"
    } else if score >= 20.0 {
        "Poor connection - Consider upgrading your plan"
    } else {
        "Very poor connection - Contact your provider for assistance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert!(describe(Some(81.0)).starts_with("Excellent"));
        assert!(describe(Some(80.0)).starts_with("Excellent"));
        assert!(describe(Some(75.0)).starts_with("Good"));
        assert!(describe(Some(60.0)).starts_with("Good"));
        assert!(describe(Some(40.0)).starts_with("Fair"));
        assert!(describe(Some(20.0)).starts_with("Poor"));
        assert!(describe(Some(19.9)).starts_with("Very poor"));
    }

    #[test]
    fn missing_score_is_unavailable() {
        assert_eq!(describe(None), "Network quality analysis unavailable");
    }

    #[test]
    fn overall_prefers_streaming_then_gaming_then_rtc() {
        let scores = Scores { streaming: Some(70.0), gaming: Some(50.0), rtc: Some(30.0) };
        assert_eq!(scores.overall(), Some(70.0));

        let scores = Scores { streaming: None, gaming: Some(50.0), rtc: Some(30.0) };
        assert_eq!(scores.overall(), Some(50.0));

        let scores = Scores { streaming: None, gaming: None, rtc: Some(30.0) };
        assert_eq!(scores.overall(), Some(30.0));

        assert_eq!(Scores::default().overall(), None);
    }
}
