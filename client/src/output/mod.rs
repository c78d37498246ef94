//! Console output and the shareable summary

use speedmark_common::report::FinalReport;

use crate::session::Progress;

/// Print a progress update line.
pub fn progress(progress: &Progress) {
    if progress.message.is_empty() {
        return;
    }
    println!(
        "[{}] [{:>3}%] {}",
        chrono::Local::now().format("%H:%M:%S"),
        progress.percent,
        progress.message
    );
}

/// Print the final report block.
pub fn final_report(report: &FinalReport) {
    println!();
    println!("Results");
    println!("  Download:    {}", report.download_text());
    println!("  Upload:      {}", report.upload_text());
    println!("  Latency:     {}", report.latency_text());
    println!("  Jitter:      {}", report.jitter_text());
    println!("  Packet loss: {}", report.packet_loss_text());
    println!();
    println!(
        "Quality score: {} - {}",
        report.quality.badge(),
        report.quality.description
    );
}

/// Plain-text summary for sharing. This string is the whole data
/// contract; how it leaves the machine is up to the caller.
pub fn share_text(report: &FinalReport) -> String {
    format!(
        "My Internet Speed Test Results:\n\
         Download: {}\n\
         Upload: {}\n\
         Latency: {}\n\
         Jitter: {}\n",
        report.download_text(),
        report.upload_text(),
        report.latency_text(),
        report.jitter_text(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedmark_common::report::EngineSummary;

    #[test]
    fn share_text_uses_placeholders_for_missing_fields() {
        let report = FinalReport::from_summary(&EngineSummary::default());
        let text = share_text(&report);
        assert!(text.contains("Download: N/A"));
        assert!(text.contains("Jitter: N/A"));
    }
}
