pub mod config;
pub mod error;
pub mod ids;
pub mod matcher;
pub mod paths;
pub mod store;
pub mod trust;
pub mod types;

pub use config::{Config, ConfigPaths, RuleConfig, ZoneBoundaryConfig};
pub use error::WineWardenError;
pub use ids::{RunId, SessionKey};
pub use matcher::Matcher;
pub use paths::{PathAction, Zone, ZoneBoundary};
pub use store::{ExecutableIdentity, TrustRecord, TrustStore};
pub use trust::{TrustSignal, TrustTier};
pub use types::{AccessAttempt, Operation};
