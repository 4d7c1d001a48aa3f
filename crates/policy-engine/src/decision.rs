use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use winewarden_core::paths::Zone;

pub const NO_MATCH_RULE_ID: &str = "no_match";
pub const NO_MATCH_RATIONALE: &str = "no matching rule";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: DecisionAction,
    pub rule_id: String,
    pub rationale: String,
    pub systemic_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DecisionAction {
    Allow,
    Deny,
    Redirect { target_path: PathBuf },
    Virtualize { shadow_path: PathBuf },
}

impl DecisionAction {
    pub fn is_allow(&self) -> bool {
        matches!(self, DecisionAction::Allow)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DecisionAction::Allow => "allow",
            DecisionAction::Deny => "deny",
            DecisionAction::Redirect { .. } => "redirect",
            DecisionAction::Virtualize { .. } => "virtualize",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionAction::Redirect { target_path } => {
                write!(f, "redirect -> {}", target_path.display())
            }
            DecisionAction::Virtualize { shadow_path } => {
                write!(f, "virtualize -> {}", shadow_path.display())
            }
            other => f.write_str(other.kind()),
        }
    }
}

impl PolicyDecision {
    pub fn new(action: DecisionAction, rule_id: &str, rationale: &str, zone: Zone) -> Self {
        let systemic_risk = !action.is_allow() && zone != Zone::PrefixInternal;
        Self {
            action,
            rule_id: rule_id.to_string(),
            rationale: rationale.to_string(),
            systemic_risk,
        }
    }

    /// Fail-closed verdict when no rule matches.
    pub fn no_match(zone: Zone) -> Self {
        Self::new(DecisionAction::Deny, NO_MATCH_RULE_ID, NO_MATCH_RATIONALE, zone)
    }

    pub fn is_no_match(&self) -> bool {
        self.rule_id == NO_MATCH_RULE_ID
    }
}
