use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use policy_engine::{HostFs, PolicySnapshot, PolicyVersion};
use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::paths::home_dir;

use super::load_config;

fn compile(config_path: Option<PathBuf>) -> Result<(PolicySnapshot, PathBuf)> {
    let paths = ConfigPaths::resolve()?;
    let (config, path) = load_config(config_path, &paths)?;
    let snapshot = compile_config(&config, &paths)?;
    Ok((snapshot, path))
}

fn compile_config(config: &Config, paths: &ConfigPaths) -> Result<PolicySnapshot> {
    let snapshot = PolicySnapshot::compile(
        PolicyVersion::INITIAL,
        config,
        paths,
        &home_dir(),
        Arc::new(HostFs),
    )?;
    Ok(snapshot)
}

pub fn check(config_path: Option<PathBuf>) -> Result<()> {
    let (snapshot, path) = compile(config_path)?;
    println!(
        "Policy OK: {} rules, {} zone boundaries ({})",
        snapshot.ruleset.len(),
        snapshot.classifier.zones().boundaries().len(),
        path.display()
    );
    Ok(())
}

pub fn print(config_path: Option<PathBuf>) -> Result<()> {
    let (snapshot, _) = compile(config_path)?;
    for line in describe(&snapshot) {
        println!("{line}");
    }
    Ok(())
}

fn describe(snapshot: &PolicySnapshot) -> Vec<String> {
    snapshot
        .ruleset
        .rules()
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let mut line = format!(
                "{:>3}. {} [priority {}, specificity {}] zone={} operation={} tier={} -> {}",
                index + 1,
                rule.id,
                rule.priority,
                rule.specificity,
                rule.zone,
                rule.operation,
                rule.tier,
                rule.outcome.label(),
            );
            if !rule.scopes.is_empty() {
                let scopes: Vec<&str> = rule.scopes.iter().map(|scope| scope.pattern()).collect();
                line.push_str(&format!(" paths={}", scopes.join(",")));
            }
            line.push_str(&format!(" ({})", rule.rationale));
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_policy_prints_in_evaluation_order() {
        let paths = ConfigPaths::rooted(Path::new("/cfg"), Path::new("/data"));
        let snapshot = compile_config(&Config::default_config(), &paths).unwrap();
        let lines = describe(&snapshot);
        assert_eq!(lines.len(), snapshot.ruleset.len());
        assert!(lines[0].starts_with("  1. "));
        let first = &snapshot.ruleset.rules()[0];
        assert!(lines[0].contains(&first.id));
    }
}
