use std::path::Path;

use tracing::debug;

use winewarden_core::paths::Zone;
use winewarden_core::trust::TrustTier;
use winewarden_core::types::Operation;

use crate::decision::{DecisionAction, PolicyDecision};
use crate::rules::ruleset::{PolicyRule, RuleOutcome, Ruleset};

/// Everything a decision depends on. Two equal fact sets always produce
/// equal decisions against the same ruleset.
#[derive(Debug, Clone, Copy)]
pub struct AttemptFacts<'a> {
    pub zone: Zone,
    pub operation: Operation,
    pub tier: TrustTier,
    /// Canonical host path; `None` for identifiers and ambiguous targets.
    pub target: Option<&'a Path>,
    pub prefix_root: Option<&'a Path>,
}

impl<'a> AttemptFacts<'a> {
    pub fn new(zone: Zone, operation: Operation, tier: TrustTier) -> Self {
        Self {
            zone,
            operation,
            tier,
            target: None,
            prefix_root: None,
        }
    }

    pub fn with_target(mut self, target: &'a Path, prefix_root: &'a Path) -> Self {
        self.target = Some(target);
        self.prefix_root = Some(prefix_root);
        self
    }
}

pub fn first_match<'r>(
    zone: Zone,
    operation: Operation,
    tier: TrustTier,
    target: Option<&Path>,
    ruleset: &'r Ruleset,
) -> Option<&'r PolicyRule> {
    ruleset
        .rules()
        .iter()
        .find(|rule| rule.matches(zone, operation, tier, target))
}

pub fn evaluate(facts: &AttemptFacts<'_>, ruleset: &Ruleset) -> PolicyDecision {
    let Some(rule) = first_match(facts.zone, facts.operation, facts.tier, facts.target, ruleset) else {
        debug!(zone = %facts.zone, operation = %facts.operation, tier = %facts.tier, "no rule matched");
        return PolicyDecision::no_match(facts.zone);
    };

    let action = match &rule.outcome {
        RuleOutcome::Allow => DecisionAction::Allow,
        RuleOutcome::Deny => DecisionAction::Deny,
        RuleOutcome::Redirect(template) => DecisionAction::Redirect {
            target_path: template.materialize(facts.prefix_root, facts.target, ruleset.home()),
        },
        RuleOutcome::Virtualize(template) => DecisionAction::Virtualize {
            shadow_path: template.materialize(facts.prefix_root, facts.target, ruleset.home()),
        },
    };
    debug!(rule = %rule.id, action = action.kind(), zone = %facts.zone, "rule matched");
    PolicyDecision::new(action, &rule.id, &rule.rationale, facts.zone)
}

/// Target-independent form: path-scoped rules never match.
pub fn evaluate_parts(zone: Zone, operation: Operation, tier: TrustTier, ruleset: &Ruleset) -> PolicyDecision {
    evaluate(&AttemptFacts::new(zone, operation, tier), ruleset)
}
