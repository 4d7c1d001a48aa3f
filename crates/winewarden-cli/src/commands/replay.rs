use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use monitor::{Monitor, ReplayRequest};
use policy_engine::{JsonlSink, MediationEngine};
use reporting::json::render_json;
use reporting::SessionReport;
use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::ids::{RunId, SessionKey};
use winewarden_core::store::{session_key_for, TrustStore};
use winewarden_core::trust::TrustTier;

use super::{absolute, load_config};

pub struct ReplayInputs {
    pub config_path: Option<PathBuf>,
    pub event_log: PathBuf,
    pub prefix: PathBuf,
    pub game: Option<String>,
    pub trust_override: Option<TrustTier>,
    pub pirate_safe: bool,
    pub audit_out: Option<PathBuf>,
    pub force: bool,
    pub json: bool,
}

pub fn execute(inputs: ReplayInputs) -> Result<()> {
    let paths = ConfigPaths::resolve()?;
    let (mut config, _) = load_config(inputs.config_path.clone(), &paths)?;
    if inputs.pirate_safe {
        config.trust.pirate_safe = true;
    }

    let prefix_root = absolute(&inputs.prefix)?;
    let event_log = absolute(&inputs.event_log)?;
    let (session, executable) = match &inputs.game {
        Some(game) => session_key_for(game)?,
        None => (default_session(&prefix_root), None),
    };

    let run_id = RunId::new();
    let audit_path = match &inputs.audit_out {
        Some(path) => absolute(path)?,
        None => paths.data_dir.join("audit").join(format!("{run_id}.jsonl")),
    };
    check_audit_out(&audit_path, inputs.force)?;
    let sink = JsonlSink::create(&audit_path)?;

    let mut trust_store = TrustStore::load(&paths.trust_db_path)?;
    let engine = MediationEngine::builder(config.clone(), paths.clone())
        .sink(sink)
        .trust_store(trust_store.clone())
        .build()?;
    if let Some(tier) = inputs.trust_override {
        engine.trust().set(&session, tier);
    }
    let trust_tier = engine.trust().get(&session);

    let monitor = Monitor::new(Arc::new(engine));
    let report = monitor.replay(&ReplayRequest {
        run_id,
        event_log,
        prefix_root,
        session: session.clone(),
        executable,
    })?;
    info!(audit = %audit_path.display(), "audit trail written");

    trust_store.record_run(&session, trust_tier);
    trust_store.save(&paths.trust_db_path)?;
    store_report(&paths, &config, &report)?;

    if inputs.json || (config.reporting.structured_json && !config.reporting.human_summary) {
        println!("{}", render_json(&report));
    } else {
        println!("{}", report.human_summary());
    }
    Ok(())
}

fn default_session(prefix_root: &std::path::Path) -> SessionKey {
    let name = prefix_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string());
    SessionKey::new(name)
}

/// Each run writes one chain from genesis, so an existing log is only
/// replaced on request.
fn check_audit_out(path: &std::path::Path, force: bool) -> Result<()> {
    let existing = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("inspect audit log {}", path.display()))
        }
    };
    if existing > 0 && !force {
        bail!(
            "audit log {} already exists; pass --force to replace it",
            path.display()
        );
    }
    Ok(())
}

fn store_report(paths: &ConfigPaths, config: &Config, report: &SessionReport) -> Result<()> {
    if !config.reporting.store_reports {
        return Ok(());
    }
    fs::create_dir_all(&paths.report_dir)
        .with_context(|| format!("create report dir {}", paths.report_dir.display()))?;

    let report_path = paths.report_dir.join(format!("{}.json", report.run_id));
    fs::write(&report_path, render_json(report))
        .with_context(|| format!("write report {}", report_path.display()))?;
    Ok(())
}
