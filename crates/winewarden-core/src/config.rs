use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::matcher::Matcher;
use crate::paths::{PathAction, Zone};
use crate::trust::TrustTier;
use crate::types::Operation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trust: TrustConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub reporting: ReportConfig,
    #[serde(default)]
    pub zones: Vec<ZoneBoundaryConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    pub default_tier: TrustTier,
    #[serde(default)]
    pub pirate_safe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub max_symlink_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Records held while the sink is unavailable before the session is failed.
    pub buffer_capacity: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub store_reports: bool,
    pub human_summary: bool,
    pub structured_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneBoundaryConfig {
    pub zone: Zone,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    pub id: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub zone: Matcher<Zone>,
    #[serde(default)]
    pub operation: Matcher<Operation>,
    #[serde(default)]
    pub tier: Matcher<TrustTier>,
    /// Optional host path scopes; `*` matches exactly one segment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    pub action: PathAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    pub rationale: String,
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub report_dir: PathBuf,
    pub trust_db_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_capacity: 4096,
            max_symlink_depth: 40,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 65_536,
            max_retries: 5,
            retry_backoff_ms: 50,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            store_reports: true,
            human_summary: true,
            structured_json: true,
        }
    }
}

impl RuleConfig {
    fn new(
        id: &str,
        priority: u32,
        zone: Matcher<Zone>,
        operation: Matcher<Operation>,
        tier: Matcher<TrustTier>,
        action: PathAction,
        rationale: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            priority,
            zone,
            operation,
            tier,
            paths: Vec::new(),
            action,
            redirect_to: None,
            rationale: rationale.to_string(),
        }
    }

    fn scoped(mut self, paths: &[&str]) -> Self {
        self.paths = paths.iter().map(|path| path.to_string()).collect();
        self
    }

    fn redirect_to(mut self, template: &str) -> Self {
        self.redirect_to = Some(template.to_string());
        self
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            trust: TrustConfig {
                default_tier: TrustTier::Yellow,
                pirate_safe: false,
            },
            engine: EngineConfig::default(),
            audit: AuditConfig::default(),
            reporting: ReportConfig::default(),
            zones: default_zones(),
            rules: default_rules(),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("parse config TOML")?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let output = toml::to_string_pretty(self).context("render config TOML")?;
        Ok(output)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).with_context(|| format!("write config at {}", path.display()))?;
        Ok(())
    }
}

impl ConfigPaths {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("io", "winewarden", "winewarden")
            .ok_or_else(|| anyhow::anyhow!("unable to determine project directories"))?;
        let config_dir = project_dirs.config_dir();
        let data_dir = project_dirs.data_dir();
        Ok(Self::rooted(config_dir, data_dir))
    }

    /// Lays out all paths under explicit config and data directories.
    pub fn rooted(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            config_path: config_dir.join("config.toml"),
            data_dir: data_dir.to_path_buf(),
            report_dir: data_dir.join("reports"),
            trust_db_path: data_dir.join("trust.json"),
        }
    }
}

fn zone(zone: Zone, path: &str) -> ZoneBoundaryConfig {
    ZoneBoundaryConfig {
        zone,
        path: path.to_string(),
    }
}

pub fn default_zones() -> Vec<ZoneBoundaryConfig> {
    vec![
        zone(Zone::SacredHome, "${HOME}"),
        zone(Zone::SacredCredential, "${HOME}/.ssh"),
        zone(Zone::SacredCredential, "${HOME}/.gnupg"),
        zone(Zone::SacredCredential, "${HOME}/.password-store"),
        zone(Zone::SacredCredential, "${HOME}/.local/share/keyrings"),
        zone(Zone::SacredSystemConfig, "${HOME}/.config"),
        zone(Zone::SacredSystemConfig, "/etc"),
        zone(Zone::SacredSystemSocket, "/run/user"),
        zone(Zone::SacredSystemSocket, "/run/dbus"),
        zone(Zone::SacredSystemSocket, "/var/run/dbus"),
        zone(Zone::SacredSystemSocket, "/tmp/.X11-unix"),
    ]
}

pub fn default_rules() -> Vec<RuleConfig> {
    use Matcher::{Any, Exact};

    let relaxed = || Matcher::one_of([TrustTier::Green, TrustTier::Yellow]);
    let read_only = || Matcher::one_of([Operation::Read, Operation::Execute]);

    vec![
        RuleConfig::new(
            "pulse_audio_socket",
            300,
            Exact(Zone::SacredSystemSocket),
            Exact(Operation::Connect),
            relaxed(),
            PathAction::Allow,
            "audio:pulse",
        )
        .scoped(&["/run/user/*/pulse"]),
        RuleConfig::new(
            "sacred_credential",
            200,
            Exact(Zone::SacredCredential),
            Any,
            Any,
            PathAction::Deny,
            "sacred_zone:credential",
        ),
        RuleConfig::new(
            "sacred_system_socket",
            200,
            Exact(Zone::SacredSystemSocket),
            Any,
            Any,
            PathAction::Deny,
            "sacred_zone:system_socket",
        ),
        RuleConfig::new(
            "prefix_internal_green",
            100,
            Exact(Zone::PrefixInternal),
            Any,
            Exact(TrustTier::Green),
            PathAction::Allow,
            "prefix_internal:trusted",
        ),
        RuleConfig::new(
            "prefix_internal_yellow",
            100,
            Exact(Zone::PrefixInternal),
            Any,
            Exact(TrustTier::Yellow),
            PathAction::Allow,
            "prefix_internal:partial",
        ),
        RuleConfig::new(
            "prefix_internal_red_read",
            100,
            Exact(Zone::PrefixInternal),
            read_only(),
            Exact(TrustTier::Red),
            PathAction::Allow,
            "prefix_internal:restricted_read",
        ),
        RuleConfig::new(
            "prefix_internal_red_destructive",
            100,
            Exact(Zone::PrefixInternal),
            Any,
            Exact(TrustTier::Red),
            PathAction::Deny,
            "prefix_internal:restricted_write",
        ),
        RuleConfig::new(
            "sacred_home_redirect",
            50,
            Exact(Zone::SacredHome),
            Any,
            Any,
            PathAction::Redirect,
            "sacred_zone:home",
        )
        .redirect_to("${PREFIX}/shadow"),
        RuleConfig::new(
            "sacred_system_config_redirect",
            50,
            Exact(Zone::SacredSystemConfig),
            Any,
            relaxed(),
            PathAction::Redirect,
            "sacred_zone:system_config",
        )
        .redirect_to("${PREFIX}/shadow"),
        RuleConfig::new(
            "host_runtime_read",
            10,
            Exact(Zone::Unclassified),
            read_only(),
            relaxed(),
            PathAction::Allow,
            "host_runtime:read",
        ),
        RuleConfig::new(
            "network_outbound",
            10,
            Exact(Zone::Unclassified),
            Exact(Operation::Connect),
            relaxed(),
            PathAction::Allow,
            "network:outbound",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let config = Config::default_config();
        let rendered = config.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.rules, config.rules);
        assert_eq!(parsed.zones, config.zones);
        assert_eq!(parsed.trust.default_tier, TrustTier::Yellow);
    }

    #[test]
    fn test_minimal_config_uses_section_defaults() {
        let config = Config::from_toml_str(
            r#"
            [trust]
            default_tier = "red"

            [[rules]]
            id = "deny_everything"
            action = "deny"
            rationale = "lockdown"
            "#,
        )
        .unwrap();
        assert_eq!(config.trust.default_tier, TrustTier::Red);
        assert!(config.engine.cache_enabled);
        assert!(config.zones.is_empty());
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].zone, Matcher::Any);
        assert_eq!(config.rules[0].priority, 0);
    }

    #[test]
    fn test_missing_rules_parse_as_empty() {
        let config = Config::from_toml_str("[trust]\ndefault_tier = \"green\"\n").unwrap();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let config = Config::default_config();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.rules.len(), config.rules.len());
    }
}
