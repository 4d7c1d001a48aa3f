//! Compiled, validated rule order.
//!
//! Rules are ordered once at load time (priority descending, then
//! specificity descending, then declaration order) and never reordered
//! afterwards. A rule that can never fire because an earlier rule accepts
//! everything it accepts is rejected when the outcomes differ.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use winewarden_core::config::{ConfigPaths, RuleConfig};
use winewarden_core::error::WineWardenError;
use winewarden_core::matcher::Matcher;
use winewarden_core::paths::{expand_with_home, normalize_lexically, PathAction, Zone};
use winewarden_core::trust::TrustTier;
use winewarden_core::types::Operation;

const PREFIX_VAR: &str = "${PREFIX}";
const SCOPE_SPECIFICITY: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScopeSegment {
    Literal(String),
    Wildcard,
    Glob(String),
}

impl ScopeSegment {
    fn parse(segment: &str) -> Self {
        if segment == "*" {
            ScopeSegment::Wildcard
        } else if segment.contains('*') {
            ScopeSegment::Glob(segment.to_string())
        } else {
            ScopeSegment::Literal(segment.to_string())
        }
    }

    fn accepts(&self, name: &str) -> bool {
        match self {
            ScopeSegment::Literal(literal) => literal == name,
            ScopeSegment::Wildcard => true,
            ScopeSegment::Glob(pattern) => glob_segment(pattern, name),
        }
    }

    fn covers(&self, other: &ScopeSegment) -> bool {
        match (self, other) {
            (ScopeSegment::Wildcard, _) => true,
            (ScopeSegment::Glob(pattern), ScopeSegment::Literal(literal)) => glob_segment(pattern, literal),
            (a, b) => a == b,
        }
    }
}

/// Matches one path segment against a pattern where `*` spans any run of
/// characters within the segment.
fn glob_segment(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return pattern == name,
    };
    if !name.starts_with(first) {
        return false;
    }
    let mut position = first.len();
    let Some((last, middle)) = rest.split_last() else {
        return name == *first;
    };
    for part in middle {
        match name[position..].find(part) {
            Some(found) => position += found + part.len(),
            None => return false,
        }
    }
    name.len() >= position + last.len() && name[position..].ends_with(last)
}

/// Host path prefix a rule is restricted to; `*` matches exactly one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathScope {
    pattern: String,
    segments: Vec<ScopeSegment>,
}

impl PathScope {
    pub fn parse(raw: &str, home: &Path, paths: &ConfigPaths) -> Result<Self, WineWardenError> {
        if raw.contains(PREFIX_VAR) {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "path scope {raw} cannot use {PREFIX_VAR}; prefix paths are matched by zone"
            )));
        }
        let expanded = expand_with_home(raw, home, paths, None)?;
        if !expanded.is_absolute() {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "path scope {raw} must be absolute"
            )));
        }
        let normalized = normalize_lexically(&expanded);
        let segments = normalized
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(ScopeSegment::parse(&part.to_string_lossy())),
                _ => None,
            })
            .collect();
        Ok(Self {
            pattern: normalized.to_string_lossy().into_owned(),
            segments,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, target: &Path) -> bool {
        if !target.is_absolute() {
            return false;
        }
        let mut names = target.components().filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        });
        self.segments.iter().all(|segment| {
            names
                .next()
                .is_some_and(|name| segment.accepts(&name))
        })
    }

    /// True when every path this scope accepts is also accepted by `self`.
    pub fn covers(&self, other: &PathScope) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(outer, inner)| outer.covers(inner))
    }
}

/// Where a redirect or virtualize outcome materializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowTemplate {
    /// Relative to the session's prefix root (`${PREFIX}/shadow`).
    PrefixRelative(PathBuf),
    Absolute(PathBuf),
}

impl ShadowTemplate {
    pub fn parse(raw: &str, home: &Path, paths: &ConfigPaths) -> Result<Self, WineWardenError> {
        if let Some(rest) = raw.strip_prefix(PREFIX_VAR) {
            if rest.contains(PREFIX_VAR) {
                return Err(WineWardenError::UnloadableRuleset(format!(
                    "redirect template {raw} repeats {PREFIX_VAR}"
                )));
            }
            let rest = rest.trim_start_matches('/');
            let relative = expand_with_home(rest, home, paths, None)?;
            if relative.is_absolute() {
                return Err(WineWardenError::UnloadableRuleset(format!(
                    "redirect template {raw} escapes the prefix"
                )));
            }
            return Ok(ShadowTemplate::PrefixRelative(normalize_lexically(&relative)));
        }
        if raw.contains(PREFIX_VAR) {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "{PREFIX_VAR} must lead redirect template {raw}"
            )));
        }
        let expanded = expand_with_home(raw, home, paths, None)?;
        if !expanded.is_absolute() {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "redirect template {raw} must be absolute or start with {PREFIX_VAR}"
            )));
        }
        Ok(ShadowTemplate::Absolute(normalize_lexically(&expanded)))
    }

    pub fn root(&self, prefix_root: Option<&Path>) -> PathBuf {
        match self {
            ShadowTemplate::Absolute(path) => path.clone(),
            ShadowTemplate::PrefixRelative(relative) => match prefix_root {
                Some(prefix) => prefix.join(relative),
                None => relative.clone(),
            },
        }
    }

    /// `~/Documents/x` lands at `<shadow>/Documents/x`; anything outside home
    /// keeps its full path below the shadow (`<shadow>/etc/hosts`).
    pub fn materialize(&self, prefix_root: Option<&Path>, target: Option<&Path>, home: &Path) -> PathBuf {
        let root = self.root(prefix_root);
        let Some(target) = target else {
            return root;
        };
        let relative = match target.strip_prefix(home) {
            Ok(relative) if home != Path::new("/") => relative.to_path_buf(),
            _ => target
                .strip_prefix("/")
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| target.to_path_buf()),
        };
        root.join(relative)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Allow,
    Deny,
    Redirect(ShadowTemplate),
    Virtualize(ShadowTemplate),
}

impl RuleOutcome {
    fn from_config(rule: &RuleConfig, home: &Path, paths: &ConfigPaths) -> Result<Self, WineWardenError> {
        let template = |rule: &RuleConfig| -> Result<ShadowTemplate, WineWardenError> {
            let raw = rule.redirect_to.as_deref().ok_or_else(|| {
                WineWardenError::UnloadableRuleset(format!(
                    "rule {} needs redirect_to for action {:?}",
                    rule.id, rule.action
                ))
            })?;
            ShadowTemplate::parse(raw, home, paths)
        };
        match rule.action {
            PathAction::Allow | PathAction::Deny if rule.redirect_to.is_some() => {
                Err(WineWardenError::UnloadableRuleset(format!(
                    "rule {} sets redirect_to but does not redirect",
                    rule.id
                )))
            }
            PathAction::Allow => Ok(RuleOutcome::Allow),
            PathAction::Deny => Ok(RuleOutcome::Deny),
            PathAction::Redirect => Ok(RuleOutcome::Redirect(template(rule)?)),
            PathAction::Virtualize => Ok(RuleOutcome::Virtualize(template(rule)?)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RuleOutcome::Allow => "allow",
            RuleOutcome::Deny => "deny",
            RuleOutcome::Redirect(_) => "redirect",
            RuleOutcome::Virtualize(_) => "virtualize",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub id: String,
    pub priority: u32,
    pub zone: Matcher<Zone>,
    pub operation: Matcher<Operation>,
    pub tier: Matcher<TrustTier>,
    pub scopes: Vec<PathScope>,
    pub outcome: RuleOutcome,
    pub rationale: String,
    pub specificity: u32,
    pub declared: usize,
}

impl PolicyRule {
    pub fn from_config(
        rule: &RuleConfig,
        declared: usize,
        home: &Path,
        paths: &ConfigPaths,
    ) -> Result<Self, WineWardenError> {
        if rule.id.trim().is_empty() {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "rule #{declared} has an empty id"
            )));
        }
        if rule.zone.is_empty() || rule.operation.is_empty() || rule.tier.is_empty() {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "rule {} has an empty matcher and can never match",
                rule.id
            )));
        }
        let scopes = rule
            .paths
            .iter()
            .map(|raw| PathScope::parse(raw, home, paths))
            .collect::<Result<Vec<_>, _>>()?;
        let outcome = RuleOutcome::from_config(rule, home, paths)?;
        let mut specificity =
            rule.zone.specificity() + rule.operation.specificity() + rule.tier.specificity();
        if !scopes.is_empty() {
            specificity += SCOPE_SPECIFICITY;
        }
        Ok(Self {
            id: rule.id.clone(),
            priority: rule.priority,
            zone: rule.zone.clone(),
            operation: rule.operation.clone(),
            tier: rule.tier.clone(),
            scopes,
            outcome,
            rationale: rule.rationale.clone(),
            specificity,
            declared,
        })
    }

    pub fn matches(&self, zone: Zone, operation: Operation, tier: TrustTier, target: Option<&Path>) -> bool {
        if !(self.zone.accepts(&zone) && self.operation.accepts(&operation) && self.tier.accepts(&tier)) {
            return false;
        }
        if self.scopes.is_empty() {
            return true;
        }
        target.is_some_and(|target| self.scopes.iter().any(|scope| scope.matches(target)))
    }

    /// True when this rule accepts every attempt `later` accepts.
    pub fn covers(&self, later: &PolicyRule) -> bool {
        let scopes_cover = self.scopes.is_empty()
            || (!later.scopes.is_empty()
                && later
                    .scopes
                    .iter()
                    .all(|inner| self.scopes.iter().any(|outer| outer.covers(inner))));
        scopes_cover
            && self.zone.covers(&later.zone)
            && self.operation.covers(&later.operation)
            && self.tier.covers(&later.tier)
    }
}

/// An ordered, validated rule list bound to the home directory it was
/// expanded against.
#[derive(Debug, Clone)]
pub struct Ruleset {
    rules: Vec<PolicyRule>,
    home: PathBuf,
}

impl Ruleset {
    pub fn compile(configs: &[RuleConfig], home: &Path, paths: &ConfigPaths) -> Result<Self, WineWardenError> {
        if configs.is_empty() {
            return Err(WineWardenError::UnloadableRuleset(
                "policy defines no rules; refusing to run without a ruleset".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(configs.len());
        for (declared, config) in configs.iter().enumerate() {
            if !seen.insert(config.id.as_str()) {
                return Err(WineWardenError::UnloadableRuleset(format!(
                    "duplicate rule id {}",
                    config.id
                )));
            }
            rules.push(PolicyRule::from_config(config, declared, home, paths)?);
        }

        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.specificity.cmp(&a.specificity))
                .then(a.declared.cmp(&b.declared))
        });
        validate_shadowing(&rules)?;

        info!(rules = rules.len(), "compiled ruleset");
        Ok(Self {
            rules,
            home: home.to_path_buf(),
        })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn validate_shadowing(rules: &[PolicyRule]) -> Result<(), WineWardenError> {
    for (index, later) in rules.iter().enumerate() {
        let Some(earlier) = rules[..index].iter().find(|earlier| earlier.covers(later)) else {
            continue;
        };
        if earlier.outcome != later.outcome {
            return Err(WineWardenError::UnloadableRuleset(format!(
                "rule {} ({}) is unreachable: rule {} ({}) always matches first",
                later.id,
                later.outcome.label(),
                earlier.id,
                earlier.outcome.label()
            )));
        }
        warn!(rule = %later.id, shadowed_by = %earlier.id, "rule is redundant");
    }
    Ok(())
}
