use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use winewarden_core::config::{ConfigPaths, ZoneBoundaryConfig};
use winewarden_core::error::WineWardenError;
use winewarden_core::paths::{Zone, ZoneBoundary};

pub mod canonical;

use canonical::{CanonicalTarget, Canonicalizer, FsView, ResolutionFence};

/// Zone boundaries ordered most specific first.
#[derive(Debug, Clone, Default)]
pub struct ZoneMap {
    boundaries: Vec<ZoneBoundary>,
}

impl ZoneMap {
    pub fn new(mut boundaries: Vec<ZoneBoundary>) -> Self {
        boundaries.sort_by(|a, b| b.depth().cmp(&a.depth()));
        Self { boundaries }
    }

    pub fn from_config(
        zones: &[ZoneBoundaryConfig],
        home: &Path,
        paths: &ConfigPaths,
    ) -> Result<Self, WineWardenError> {
        let boundaries = zones
            .iter()
            .map(|zone| ZoneBoundary::from_config(zone, home, paths))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(boundaries))
    }

    /// Longest matching boundary.
    pub fn lookup(&self, path: &Path) -> Option<&ZoneBoundary> {
        self.boundaries.iter().find(|boundary| boundary.matches(path))
    }

    pub fn boundaries(&self) -> &[ZoneBoundary] {
        &self.boundaries
    }
}

impl ResolutionFence for ZoneMap {
    /// Home is too broad to fence: prefixes usually live under it.
    fn stops_at(&self, path: &Path) -> bool {
        self.lookup(path)
            .is_some_and(|boundary| boundary.zone.is_sacred() && boundary.zone != Zone::SacredHome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub target: CanonicalTarget,
    pub zone: Zone,
    pub boundary: Option<PathBuf>,
    /// Set when canonicalization failed; the target is then `Unclassified`
    /// and must take the fail-closed path.
    pub ambiguity: Option<String>,
}

impl Classification {
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguity.is_some()
    }
}

#[derive(Clone)]
pub struct ZoneClassifier {
    zones: ZoneMap,
    home: PathBuf,
    max_symlink_depth: u32,
    fs: Arc<dyn FsView>,
}

impl std::fmt::Debug for ZoneClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneClassifier")
            .field("zones", &self.zones)
            .field("home", &self.home)
            .field("max_symlink_depth", &self.max_symlink_depth)
            .finish_non_exhaustive()
    }
}

impl ZoneClassifier {
    pub fn new(zones: ZoneMap, home: PathBuf, max_symlink_depth: u32, fs: Arc<dyn FsView>) -> Self {
        Self {
            zones,
            home,
            max_symlink_depth,
            fs,
        }
    }

    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Canonical form of a prefix root, computed once per session.
    pub fn canonical_prefix(&self, prefix_root: &Path) -> PathBuf {
        canonical::canonical_root(self.fs.as_ref(), prefix_root, self.max_symlink_depth)
    }

    pub fn classify(&self, raw_target: &str, prefix_root: &Path) -> Zone {
        let prefix = self.canonical_prefix(prefix_root);
        self.classify_in(raw_target, &prefix).zone
    }

    /// Classifies against an already canonical prefix root.
    pub fn classify_in(&self, raw_target: &str, canonical_prefix: &Path) -> Classification {
        let canonicalizer = Canonicalizer {
            fs: self.fs.as_ref(),
            home: &self.home,
            prefix_root: canonical_prefix,
            max_symlink_depth: self.max_symlink_depth,
            fence: &self.zones,
        };

        let target = match canonicalizer.canonicalize(raw_target) {
            Ok(target) => target,
            Err(err) => {
                debug!(target = raw_target, error = %err, "classification ambiguous");
                return Classification {
                    target: CanonicalTarget {
                        path: PathBuf::from(raw_target),
                        identifier: true,
                        windows_origin: false,
                    },
                    zone: Zone::Unclassified,
                    boundary: None,
                    ambiguity: Some(err.to_string()),
                };
            }
        };

        let (zone, boundary) = self.zone_for(&target, canonical_prefix);
        Classification {
            target,
            zone,
            boundary,
            ambiguity: None,
        }
    }

    fn zone_for(&self, target: &CanonicalTarget, canonical_prefix: &Path) -> (Zone, Option<PathBuf>) {
        if target.identifier {
            return (Zone::Unclassified, None);
        }
        if target.path.starts_with(canonical_prefix) {
            return (Zone::PrefixInternal, Some(canonical_prefix.to_path_buf()));
        }
        match self.zones.lookup(&target.path) {
            Some(boundary) => (boundary.zone, Some(boundary.path.clone())),
            None => (Zone::Unclassified, None),
        }
    }
}
