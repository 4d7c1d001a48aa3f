use std::path::Path;

use policy_engine::{AuditRecord, DecisionAction};
use time::format_description::well_known::Rfc3339;

use crate::redact::redact_with_home;

pub fn timeline(records: &[AuditRecord], home: &Path) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let when = record
                .attempt
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| record.attempt.timestamp.to_string());
            let target = redact_with_home(Path::new(&record.canonical_target), home);
            let outcome = match &record.decision {
                DecisionAction::Redirect { target_path } => {
                    format!("redirected to {}", redact_with_home(target_path, home))
                }
                DecisionAction::Virtualize { shadow_path } => {
                    format!("virtualized at {}", redact_with_home(shadow_path, home))
                }
                DecisionAction::Allow => "allowed".to_string(),
                DecisionAction::Deny => "denied".to_string(),
            };
            format!(
                "{when} #{seq} pid {pid} {op} {target}: {outcome} ({rationale})",
                seq = record.sequence,
                pid = record.attempt.pid,
                op = record.attempt.operation,
                rationale = record.rationale,
            )
        })
        .collect()
}
