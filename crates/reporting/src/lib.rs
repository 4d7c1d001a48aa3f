use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use policy_engine::{
    calculate_trust_score, AuditRecord, BehaviorProfile, DecisionAction, TrustScore, TrustScoringConfig,
};
use winewarden_core::ids::{RunId, SessionKey};
use winewarden_core::trust::{TrustSignal, TrustTier};

pub mod audit_log;
pub mod human;
pub mod json;
pub mod redact;
pub mod timeline;

pub use audit_log::{
    read_audit_log, verify_chain, verify_chain_segment, ChainBreak, ChainVerification,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: RunId,
    pub session: SessionKey,
    pub executable: Option<PathBuf>,
    pub prefix_root: PathBuf,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub trust_tier: TrustTier,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total_attempts: u32,
    pub denied: u32,
    pub redirected: u32,
    pub virtualized: u32,
    pub allowed: u32,
    pub systemic_risks: u32,
    /// Targets that could not be canonicalized and were denied by default.
    pub ambiguous: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub run_id: RunId,
    pub metadata: RunMetadata,
    pub trust_signal: TrustSignal,
    pub records: Vec<AuditRecord>,
    pub stats: ReportStats,
    pub skipped_events: u64,
    pub chain: ChainVerification,
    pub trust_score: TrustScore,
}

impl SessionReport {
    pub fn new(metadata: RunMetadata, records: Vec<AuditRecord>) -> Self {
        let stats = ReportStats::from_records(&records);
        let chain = verify_chain(&records);
        let trust_score = recommend_trust(metadata.trust_tier, &records);
        Self {
            run_id: metadata.run_id,
            trust_signal: trust_signal_for_tier(metadata.trust_tier),
            metadata,
            records,
            stats,
            skipped_events: 0,
            chain,
            trust_score,
        }
    }

    /// Rebuilds a report from a stored audit log.
    pub fn from_audit_log(records: Vec<AuditRecord>) -> Option<Self> {
        let first = records.first()?;
        let last = records.last()?;
        let metadata = RunMetadata {
            run_id: RunId::new(),
            session: first.session.clone(),
            executable: None,
            prefix_root: PathBuf::new(),
            started_at: first.evaluated_at,
            ended_at: Some(last.evaluated_at),
            trust_tier: first.trust_tier,
        };
        Some(Self::new(metadata, records))
    }

    pub fn with_skipped(mut self, skipped: u64) -> Self {
        self.skipped_events = skipped;
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        let end = self.metadata.ended_at?;
        Some(end - self.metadata.started_at)
    }

    /// Attempts the policy let through to a sacred zone.
    pub fn sacred_allowed(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.decision.is_allow() && record.zone.is_sacred())
            .count()
    }

    /// True when the trail verifies from genesis and nothing outside the
    /// prefix was let through to a sacred zone.
    pub fn system_untouched(&self) -> bool {
        self.chain.intact && self.sacred_allowed() == 0
    }

    pub fn human_summary(&self) -> String {
        human::summary(self)
    }
}

impl ReportStats {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        let mut stats = ReportStats::default();

        for record in records {
            stats.total_attempts = stats.total_attempts.saturating_add(1);
            if record.systemic_risk {
                stats.systemic_risks = stats.systemic_risks.saturating_add(1);
            }
            if record.classification_note.is_some() {
                stats.ambiguous = stats.ambiguous.saturating_add(1);
            }
            match record.decision {
                DecisionAction::Allow => stats.allowed = stats.allowed.saturating_add(1),
                DecisionAction::Deny => stats.denied = stats.denied.saturating_add(1),
                DecisionAction::Redirect { .. } => stats.redirected = stats.redirected.saturating_add(1),
                DecisionAction::Virtualize { .. } => stats.virtualized = stats.virtualized.saturating_add(1),
            }
        }

        stats
    }

    /// Attempts that did not reach the host as asked.
    pub fn contained(&self) -> u32 {
        self.denied + self.redirected + self.virtualized
    }
}

pub fn trust_signal_for_tier(tier: TrustTier) -> TrustSignal {
    TrustSignal::from_tier(tier)
}

/// Advisory only; the active tier is never changed from here.
pub fn recommend_trust(current: TrustTier, records: &[AuditRecord]) -> TrustScore {
    let profile = BehaviorProfile::from_records(records);
    calculate_trust_score(current, &profile, &TrustScoringConfig::default())
}
