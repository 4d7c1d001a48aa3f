pub mod evaluator;
pub mod ruleset;

pub use evaluator::{evaluate, evaluate_parts, first_match, AttemptFacts};
pub use ruleset::{PathScope, PolicyRule, RuleOutcome, Ruleset, ShadowTemplate};
