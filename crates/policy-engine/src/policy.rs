use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::error::WineWardenError;

use crate::rules::Ruleset;
use crate::zones::canonical::FsView;
use crate::zones::{ZoneClassifier, ZoneMap};

/// Monotonic identifier of one immutable policy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyVersion(pub u64);

impl PolicyVersion {
    pub const INITIAL: PolicyVersion = PolicyVersion(1);

    pub fn next(self) -> Self {
        PolicyVersion(self.0 + 1)
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Zones and rules compiled together; never mutated once built.
#[derive(Debug)]
pub struct PolicySnapshot {
    pub version: PolicyVersion,
    pub ruleset: Ruleset,
    pub classifier: ZoneClassifier,
}

impl PolicySnapshot {
    pub fn compile(
        version: PolicyVersion,
        config: &Config,
        paths: &ConfigPaths,
        home: &Path,
        fs: Arc<dyn FsView>,
    ) -> Result<Self, WineWardenError> {
        let zones = ZoneMap::from_config(&config.zones, home, paths)?;
        let ruleset = Ruleset::compile(&config.rules, home, paths)?;
        let classifier = ZoneClassifier::new(
            zones,
            home.to_path_buf(),
            config.engine.max_symlink_depth,
            fs,
        );
        info!(
            version = %version,
            rules = ruleset.len(),
            zones = classifier.zones().boundaries().len(),
            "policy snapshot compiled"
        );
        Ok(Self {
            version,
            ruleset,
            classifier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::canonical::HostFs;

    #[test]
    fn test_compile_default_policy() {
        let paths = ConfigPaths::rooted(Path::new("/cfg"), Path::new("/data"));
        let snapshot = PolicySnapshot::compile(
            PolicyVersion::INITIAL,
            &Config::default_config(),
            &paths,
            Path::new("/home/user"),
            Arc::new(HostFs),
        )
        .unwrap();
        assert_eq!(snapshot.version, PolicyVersion(1));
        assert_eq!(snapshot.version.next(), PolicyVersion(2));
        assert!(!snapshot.ruleset.is_empty());
    }

    #[test]
    fn test_relative_zone_boundary_rejected() {
        let paths = ConfigPaths::rooted(Path::new("/cfg"), Path::new("/data"));
        let mut config = Config::default_config();
        config.zones[0].path = "relative/home".to_string();
        let err = PolicySnapshot::compile(
            PolicyVersion::INITIAL,
            &config,
            &paths,
            Path::new("/home/user"),
            Arc::new(HostFs),
        )
        .unwrap_err();
        assert!(matches!(err, WineWardenError::InvalidConfig(_)));
    }
}
