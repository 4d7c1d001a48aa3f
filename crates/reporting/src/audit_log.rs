//! Reading and verifying persisted audit trails.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use policy_engine::audit::GENESIS_HASH;
use policy_engine::AuditRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub sequence: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub intact: bool,
    pub checked: usize,
    pub first_break: Option<ChainBreak>,
}

/// Loads a JSON-lines audit log. Unlike event logs, a malformed line here
/// means the trail itself is damaged, so it is an error.
pub fn read_audit_log(path: &Path) -> Result<Vec<AuditRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read audit log {}", path.display()))?;
    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord = serde_json::from_str(line)
            .with_context(|| format!("parse audit log {} line {}", path.display(), index + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Verifies a whole session log: the first record must be sequence 0 and
/// link to genesis, so a log with its head cut off is reported as broken.
pub fn verify_chain(records: &[AuditRecord]) -> ChainVerification {
    walk_chain(records, true)
}

/// Verifies a contiguous excerpt of a chain, trusting its first record's
/// link to whatever came before it.
pub fn verify_chain_segment(records: &[AuditRecord]) -> ChainVerification {
    walk_chain(records, false)
}

fn walk_chain(records: &[AuditRecord], from_genesis: bool) -> ChainVerification {
    let mut checked = 0;
    let mut previous: Option<&AuditRecord> = None;

    for record in records {
        let broken = |reason: String| ChainVerification {
            intact: false,
            checked,
            first_break: Some(ChainBreak {
                sequence: record.sequence,
                reason,
            }),
        };

        match previous {
            None if from_genesis && record.sequence != 0 => {
                return broken(format!(
                    "log does not start at genesis; first sequence is {}",
                    record.sequence
                ));
            }
            None if record.sequence == 0 && record.prev_hash != GENESIS_HASH => {
                return broken("first record does not link to genesis".to_string());
            }
            Some(prev) if record.sequence != prev.sequence + 1 => {
                return broken(format!("sequence gap after {}", prev.sequence));
            }
            Some(prev) if record.prev_hash != prev.record_hash => {
                return broken(format!("prev_hash does not match record {}", prev.sequence));
            }
            _ => {}
        }
        if !record.is_intact() {
            return broken("record hash mismatch".to_string());
        }

        checked += 1;
        previous = Some(record);
    }

    ChainVerification {
        intact: true,
        checked,
        first_break: None,
    }
}
