pub mod resolver;
pub mod scoring;

pub use resolver::TrustResolver;
pub use scoring::{calculate_trust_score, BehaviorProfile, TrustScore, TrustScoringConfig};
