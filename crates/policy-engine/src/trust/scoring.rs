//! Post-session trust scoring.
//!
//! Builds a behavior profile from a session's audit records and turns it
//! into a 0-100 score with a recommended tier. The recommendation is
//! advisory; the active tier only changes through `TrustResolver::set`.

use std::collections::BTreeSet;

use serde::Serialize;

use winewarden_core::paths::Zone;
use winewarden_core::trust::TrustTier;

use crate::audit::AuditRecord;

#[derive(Debug, Clone)]
pub struct TrustScoringConfig {
    pub suspicion_threshold: u32,
    pub network_activity_weight: f32,
    pub filesystem_activity_weight: f32,
    pub sensitive_path_penalty: i32,
    pub outbound_connection_penalty: i32,
    pub denied_attempt_penalty: i32,
    pub consistency_bonus: i32,
}

impl Default for TrustScoringConfig {
    fn default() -> Self {
        Self {
            suspicion_threshold: 50,
            network_activity_weight: 0.4,
            filesystem_activity_weight: 0.3,
            sensitive_path_penalty: -10,
            outbound_connection_penalty: -5,
            denied_attempt_penalty: -3,
            consistency_bonus: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BehaviorProfile {
    /// Credential and system-socket touches.
    pub sensitive_path_attempts: u32,
    pub sacred_home_attempts: u32,
    pub unique_destinations: u32,
    pub file_modifications: u32,
    pub denied_attempts: u32,
    pub suspicious_patterns: Vec<String>,
}

impl BehaviorProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[AuditRecord]) -> Self {
        let mut profile = Self::new();
        let mut destinations = BTreeSet::new();
        for record in records {
            match record.zone {
                Zone::SacredCredential | Zone::SacredSystemSocket => {
                    profile.record_sensitive_path(&record.canonical_target);
                }
                Zone::SacredHome => profile.sacred_home_attempts += 1,
                _ => {}
            }
            if record.attempt.operation.is_network() && destinations.insert(record.canonical_target.clone()) {
                profile.record_outbound_connection(&record.canonical_target);
            }
            if record.attempt.operation.is_destructive() {
                profile.file_modifications += 1;
            }
            if !record.decision.is_allow() && record.systemic_risk {
                profile.record_denied_attempt(&record.rationale);
            }
        }
        profile
    }

    pub fn record_sensitive_path(&mut self, path: &str) {
        self.sensitive_path_attempts += 1;
        self.suspicious_patterns.push(format!("Accessed: {path}"));
    }

    pub fn record_outbound_connection(&mut self, destination: &str) {
        self.unique_destinations += 1;
        if self.unique_destinations > 10 {
            self.suspicious_patterns
                .push(format!("Many connections: {destination}"));
        }
    }

    pub fn record_denied_attempt(&mut self, rationale: &str) {
        self.denied_attempts += 1;
        self.suspicious_patterns.push(format!("Blocked: {rationale}"));
    }

    pub fn is_suspicious(&self) -> bool {
        self.sensitive_path_attempts > 0 || self.denied_attempts > 5 || !self.suspicious_patterns.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrustScore {
    pub score: u32,
    pub recommended_tier: TrustTier,
    pub assessment: String,
    pub notes: Vec<String>,
    pub is_suspicious: bool,
}

impl TrustScore {
    pub fn new(raw: i32, notes: Vec<String>, suspicion_threshold: u32) -> Self {
        let score = raw.clamp(0, 100) as u32;
        Self {
            score,
            recommended_tier: tier_from_score(score),
            assessment: assessment_from_score(score).to_string(),
            notes,
            is_suspicious: score < suspicion_threshold,
        }
    }
}

fn tier_from_score(score: u32) -> TrustTier {
    match score {
        0..=25 => TrustTier::Red,
        26..=75 => TrustTier::Yellow,
        _ => TrustTier::Green,
    }
}

fn assessment_from_score(score: u32) -> &'static str {
    match score {
        90.. => "Excellent: consistent trustworthy behavior",
        75..=89 => "Good: normal behavior patterns",
        50..=74 => "Fair: some unusual activity",
        25..=49 => "Poor: suspicious behavior observed",
        _ => "Critical: high risk activity",
    }
}

pub fn calculate_trust_score(
    current_tier: TrustTier,
    profile: &BehaviorProfile,
    config: &TrustScoringConfig,
) -> TrustScore {
    let mut score: i32 = 75;
    let mut notes = Vec::new();

    score += match current_tier {
        TrustTier::Green => 15,
        TrustTier::Yellow => 0,
        TrustTier::Red => -15,
    };

    let network = network_score(profile, config);
    score += (network * config.network_activity_weight) as i32;
    if network < 0.0 {
        notes.push(format!("Network activity penalty: {network:.1}"));
    }

    let filesystem = filesystem_score(profile, config);
    score += (filesystem * config.filesystem_activity_weight) as i32;
    if filesystem < 0.0 {
        notes.push(format!("Filesystem activity penalty: {filesystem:.1}"));
    }

    if profile.denied_attempts > 0 {
        let penalty = profile.denied_attempts as i32 * config.denied_attempt_penalty;
        score += penalty;
        notes.push(format!("Denied access attempts ({}): {penalty}", profile.denied_attempts));
    }

    if !profile.is_suspicious() && profile.denied_attempts == 0 {
        score += config.consistency_bonus;
        notes.push(format!("Consistency bonus: +{}", config.consistency_bonus));
    }

    notes.extend(
        profile
            .suspicious_patterns
            .iter()
            .map(|pattern| format!("Suspicious: {pattern}")),
    );

    TrustScore::new(score, notes, config.suspicion_threshold)
}

fn network_score(profile: &BehaviorProfile, config: &TrustScoringConfig) -> f32 {
    if profile.unique_destinations > 10 {
        config.outbound_connection_penalty as f32 * (profile.unique_destinations as f32 / 10.0)
    } else {
        0.0
    }
}

fn filesystem_score(profile: &BehaviorProfile, config: &TrustScoringConfig) -> f32 {
    let mut score = config.sensitive_path_penalty as f32 * profile.sensitive_path_attempts as f32;
    if profile.file_modifications > 100 {
        score -= (profile.file_modifications - 100) as f32 / 20.0;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_profile_scores_well() {
        let config = TrustScoringConfig::default();
        let score = calculate_trust_score(TrustTier::Yellow, &BehaviorProfile::new(), &config);
        assert_eq!(score.score, 80);
        assert_eq!(score.recommended_tier, TrustTier::Green);
        assert!(!score.is_suspicious);
    }

    #[test]
    fn test_sensitive_access_lowers_score() {
        let config = TrustScoringConfig::default();
        let mut profile = BehaviorProfile::new();
        profile.record_sensitive_path("/home/user/.ssh/id_rsa");
        for _ in 0..12 {
            profile.record_denied_attempt("sacred_zone:credential");
        }
        let score = calculate_trust_score(TrustTier::Red, &profile, &config);
        assert!(score.score <= 25, "score was {}", score.score);
        assert_eq!(score.recommended_tier, TrustTier::Red);
        assert!(score.is_suspicious);
        assert!(score.notes.iter().any(|note| note.starts_with("Suspicious: Accessed")));
    }

    #[test]
    fn test_score_is_clamped() {
        let score = TrustScore::new(-40, Vec::new(), 50);
        assert_eq!(score.score, 0);
        let score = TrustScore::new(140, Vec::new(), 50);
        assert_eq!(score.score, 100);
    }

    #[test]
    fn test_tier_bands() {
        assert_eq!(tier_from_score(90), TrustTier::Green);
        assert_eq!(tier_from_score(60), TrustTier::Yellow);
        assert_eq!(tier_from_score(20), TrustTier::Red);
    }
}
