//! Access mediation for programs running inside a Wine prefix.
//!
//! Every attempted access is canonicalized and classified into a zone, the
//! session's trust tier is resolved, the compiled ruleset picks a decision
//! (memoized per policy version), and an audit record is chained onto the
//! session trail. The engine only decides; enforcing a redirect or denial is
//! the caller's job.

pub mod audit;
pub mod cache;
mod decision;
pub mod engine;
pub mod policy;
pub mod rules;
pub mod trust;
pub mod zones;

pub use audit::{AuditRecord, AuditSink, AuditTrail, JsonlSink, MemorySink};
pub use cache::{CacheKey, CacheStats, DecisionCache};
pub use decision::{DecisionAction, PolicyDecision, NO_MATCH_RATIONALE, NO_MATCH_RULE_ID};
pub use engine::{EngineBuilder, EvaluationContext, Mediation, MediationEngine};
pub use policy::{PolicySnapshot, PolicyVersion};
pub use rules::{evaluate, evaluate_parts, first_match, AttemptFacts, PolicyRule, Ruleset};
pub use trust::{calculate_trust_score, BehaviorProfile, TrustResolver, TrustScore, TrustScoringConfig};
pub use zones::canonical::{EntryKind, FsView, HostFs};
pub use zones::{Classification, ZoneClassifier, ZoneMap};
