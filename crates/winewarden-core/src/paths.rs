use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigPaths, ZoneBoundaryConfig};
use crate::error::WineWardenError;

/// Semantic classification of a canonical target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    PrefixInternal,
    SacredHome,
    SacredCredential,
    SacredSystemConfig,
    SacredSystemSocket,
    Unclassified,
}

impl Zone {
    pub const ALL: [Zone; 6] = [
        Zone::PrefixInternal,
        Zone::SacredHome,
        Zone::SacredCredential,
        Zone::SacredSystemConfig,
        Zone::SacredSystemSocket,
        Zone::Unclassified,
    ];

    pub fn is_sacred(&self) -> bool {
        matches!(
            self,
            Zone::SacredHome
                | Zone::SacredCredential
                | Zone::SacredSystemConfig
                | Zone::SacredSystemSocket
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Zone::PrefixInternal => "Prefix",
            Zone::SacredHome => "Home outside prefix",
            Zone::SacredCredential => "Credentials",
            Zone::SacredSystemConfig => "System configuration",
            Zone::SacredSystemSocket => "System sockets",
            Zone::Unclassified => "Unclassified",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::PrefixInternal => "prefix_internal",
            Zone::SacredHome => "sacred_home",
            Zone::SacredCredential => "sacred_credential",
            Zone::SacredSystemConfig => "sacred_system_config",
            Zone::SacredSystemSocket => "sacred_system_socket",
            Zone::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rule does with an attempt once it matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PathAction {
    Allow,
    Deny,
    Redirect,
    Virtualize,
}

/// A configured host path prefix that maps everything beneath it to a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneBoundary {
    pub zone: Zone,
    pub path: PathBuf,
}

impl ZoneBoundary {
    pub fn from_config(
        config: &ZoneBoundaryConfig,
        home: &Path,
        paths: &ConfigPaths,
    ) -> Result<Self, WineWardenError> {
        let path = expand_with_home(&config.path, home, paths, None)?;
        if !path.is_absolute() {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "zone boundary for {} must be absolute after expansion: {}",
                config.zone,
                path.display()
            )));
        }
        Ok(Self {
            zone: config.zone,
            path: normalize_lexically(&path),
        })
    }

    pub fn matches(&self, candidate: &Path) -> bool {
        candidate.starts_with(&self.path)
    }

    /// Number of normal components; deeper boundaries are more specific.
    pub fn depth(&self) -> usize {
        self.path
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .count()
    }
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Expands `${HOME}`, `${DATA_DIR}`, `${CONFIG_DIR}`, `${PREFIX}` and a leading `~`.
///
/// Templates are ruleset material (zone boundaries, scopes, redirect
/// targets), so a bad one makes the ruleset unloadable. `${PREFIX}` is only
/// meaningful per session; templates using it without a prefix are rejected.
pub fn expand_with_home(
    template: &str,
    home: &Path,
    paths: &ConfigPaths,
    prefix: Option<&Path>,
) -> Result<PathBuf, WineWardenError> {
    let home_str = home.to_string_lossy();
    let mut replaced = if template == "~" {
        home_str.to_string()
    } else if let Some(rest) = template.strip_prefix("~/") {
        format!("{home_str}/{rest}")
    } else {
        template.to_string()
    };

    replaced = replaced
        .replace("${HOME}", &home_str)
        .replace("${DATA_DIR}", &paths.data_dir.to_string_lossy())
        .replace(
            "${CONFIG_DIR}",
            &paths
                .config_path
                .parent()
                .unwrap_or(&paths.data_dir)
                .to_string_lossy(),
        );

    if replaced.contains("${PREFIX}") {
        let prefix = prefix.ok_or_else(|| {
            WineWardenError::UnloadableRuleset(format!("template {template} needs a prefix root"))
        })?;
        replaced = replaced.replace("${PREFIX}", &prefix.to_string_lossy());
    }

    if replaced.contains("${") {
        return Err(WineWardenError::UnloadableRuleset(format!(
            "unknown variable in path template: {template}"
        )));
    }

    Ok(PathBuf::from(replaced))
}

/// Resolves `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
        }
    }
    out
}
