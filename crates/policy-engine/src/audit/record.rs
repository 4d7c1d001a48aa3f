//! AuditRecord: one hash-chained entry per evaluated attempt.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use winewarden_core::ids::SessionKey;
use winewarden_core::paths::Zone;
use winewarden_core::trust::TrustTier;
use winewarden_core::types::AccessAttempt;

use crate::decision::{DecisionAction, PolicyDecision};
use crate::policy::PolicyVersion;

/// `prev_hash` of the first record in a trail.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub session: SessionKey,
    pub attempt: AccessAttempt,
    pub canonical_target: String,
    pub zone: Zone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_note: Option<String>,
    pub trust_tier: TrustTier,
    pub decision: DecisionAction,
    pub rule_id: String,
    pub rationale: String,
    pub systemic_risk: bool,
    pub policy_version: PolicyVersion,
    #[serde(with = "time::serde::rfc3339")]
    pub evaluated_at: OffsetDateTime,
    pub prev_hash: String,
    pub record_hash: String,
}

/// Everything the trail needs to know about one evaluation.
#[derive(Debug, Clone)]
pub struct AuditInput {
    pub session: SessionKey,
    pub attempt: AccessAttempt,
    pub canonical_target: String,
    pub zone: Zone,
    pub classification_note: Option<String>,
    pub trust_tier: TrustTier,
    pub decision: PolicyDecision,
    pub policy_version: PolicyVersion,
}

impl AuditRecord {
    pub fn seal(input: AuditInput, sequence: u64, prev_hash: String) -> Self {
        let mut record = Self {
            sequence,
            session: input.session,
            attempt: input.attempt,
            canonical_target: input.canonical_target,
            zone: input.zone,
            classification_note: input.classification_note,
            trust_tier: input.trust_tier,
            decision: input.decision.action,
            rule_id: input.decision.rule_id,
            rationale: input.decision.rationale,
            systemic_risk: input.decision.systemic_risk,
            policy_version: input.policy_version,
            evaluated_at: OffsetDateTime::now_utc(),
            prev_hash,
            record_hash: String::new(),
        };
        record.record_hash = record.recompute_hash();
        record
    }

    /// Compare against `record_hash` to detect tampering.
    pub fn recompute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update(value.as_bytes());
            hasher.update([0x1f]);
        };
        field(&self.sequence.to_string());
        field(self.session.as_str());
        field(&self.attempt.timestamp.unix_timestamp_nanos().to_string());
        field(&self.attempt.pid.to_string());
        field(self.attempt.operation.as_str());
        field(&self.attempt.target);
        field(&self.canonical_target);
        field(self.zone.as_str());
        field(self.classification_note.as_deref().unwrap_or(""));
        field(&self.trust_tier.to_string());
        field(&decision_digest(&self.decision));
        field(&self.rule_id);
        field(&self.rationale);
        field(if self.systemic_risk { "1" } else { "0" });
        field(&self.policy_version.0.to_string());
        field(&self.evaluated_at.unix_timestamp_nanos().to_string());
        hasher.update(self.prev_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_intact(&self) -> bool {
        self.recompute_hash() == self.record_hash
    }
}

fn decision_digest(action: &DecisionAction) -> String {
    match action {
        DecisionAction::Redirect { target_path } => format!("redirect:{}", target_path.display()),
        DecisionAction::Virtualize { shadow_path } => format!("virtualize:{}", shadow_path.display()),
        other => other.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winewarden_core::types::Operation;

    fn input() -> AuditInput {
        AuditInput {
            session: SessionKey::new("game"),
            attempt: AccessAttempt {
                timestamp: OffsetDateTime::UNIX_EPOCH,
                pid: 7,
                operation: Operation::Read,
                target: "~/.ssh/id_rsa".to_string(),
            },
            canonical_target: "/home/user/.ssh/id_rsa".to_string(),
            zone: Zone::SacredCredential,
            classification_note: None,
            trust_tier: TrustTier::Green,
            decision: PolicyDecision::new(
                DecisionAction::Deny,
                "sacred_credential",
                "sacred_zone:credential",
                Zone::SacredCredential,
            ),
            policy_version: PolicyVersion(1),
        }
    }

    #[test]
    fn test_seal_and_verify() {
        let record = AuditRecord::seal(input(), 0, GENESIS_HASH.to_string());
        assert_eq!(record.record_hash.len(), 64);
        assert!(record.is_intact());

        let mut tampered = record.clone();
        tampered.decision = DecisionAction::Allow;
        assert!(!tampered.is_intact());
    }

    #[test]
    fn test_hash_survives_json_roundtrip() {
        let record = AuditRecord::seal(input(), 3, GENESIS_HASH.to_string());
        let line = serde_json::to_string(&record).unwrap();
        let parsed: AuditRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_intact());

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["decision"]["type"], "deny");
        assert_eq!(value["zone"], "sacred_credential");
        assert_eq!(value["policy_version"], 1);
        assert!(value.get("classification_note").is_none());
    }
}
