use time::Duration;

use crate::SessionReport;

pub fn summary(report: &SessionReport) -> String {
    let duration = report
        .duration()
        .map(format_duration)
        .unwrap_or_else(|| "unknown".to_string());
    let contained = report.stats.contained();
    let safe_line = if contained == 0 {
        "No dangerous access attempts succeeded.".to_string()
    } else {
        format!("{contained} dangerous access attempts were blocked or redirected.")
    };

    let mut lines = vec![format!("You played for {duration}."), safe_line];
    let sacred_allowed = report.sacred_allowed();
    if report.system_untouched() {
        lines.push("Your system remains intact.".to_string());
    } else if sacred_allowed > 0 {
        lines.push(format!(
            "{sacred_allowed} attempts outside the prefix were allowed; review the timeline."
        ));
    }
    lines.push(report.trust_signal.message.clone());
    if report.stats.ambiguous > 0 {
        lines.push(format!(
            "{} attempts had unclear targets and were denied.",
            report.stats.ambiguous
        ));
    }
    if report.skipped_events > 0 {
        lines.push(format!(
            "{} malformed events were skipped.",
            report.skipped_events
        ));
    }
    match &report.chain.first_break {
        None => {}
        Some(found) => lines.push(format!(
            "Audit trail damaged at record {}: {}.",
            found.sequence, found.reason
        )),
    }
    if report.trust_score.recommended_tier != report.metadata.trust_tier {
        lines.push(format!(
            "Suggested trust level: {} ({}).",
            report.trust_score.recommended_tier.calm_label(),
            report.trust_score.assessment
        ));
    }
    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.whole_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
