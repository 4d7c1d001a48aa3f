use std::path::Path;

use anyhow::{anyhow, Result};

use reporting::json::render_json;
use reporting::timeline::timeline;
use reporting::{read_audit_log, SessionReport};
use winewarden_core::paths::home_dir;

pub fn execute(input: &Path, json: bool, show_timeline: bool) -> Result<()> {
    let records = read_audit_log(input)?;
    let report = SessionReport::from_audit_log(records)
        .ok_or_else(|| anyhow!("audit log {} has no records", input.display()))?;

    if json {
        println!("{}", render_json(&report));
    } else {
        println!("{}", report.human_summary());
        if show_timeline {
            println!();
            for line in timeline(&report.records, &home_dir()) {
                println!("{line}");
            }
        }
    }

    if let Some(found) = &report.chain.first_break {
        return Err(anyhow!(
            "audit chain broken at record {}: {}",
            found.sequence,
            found.reason
        ));
    }
    Ok(())
}
