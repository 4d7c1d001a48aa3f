use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use monitor::{Monitor, ReplayRequest};
use policy_engine::{MediationEngine, MemorySink};
use winewarden_core::config::{Config, ConfigPaths};
use winewarden_core::ids::{RunId, SessionKey};
use winewarden_core::trust::TrustTier;

#[test]
fn test_replay_skips_malformed_and_audits_the_rest() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let home = root.join("home/user");
    let prefix = home.join("game/prefix");
    fs::create_dir_all(prefix.join("drive_c")).unwrap();
    fs::create_dir_all(home.join(".ssh")).unwrap();

    let log = root.join("events.jsonl");
    let lines = [
        format!(
            r#"{{"timestamp":"2024-05-01T12:00:00Z","pid":10,"operation":"write","target":"{}"}}"#,
            prefix.join("drive_c/save.dat").display()
        ),
        r#"{"timestamp":"2024-05-01T12:00:01Z","pid":10,"operation":"read","target":"~/.ssh/id_rsa"}"#.to_string(),
        "{ truncated".to_string(),
        String::new(),
        r#"{"timestamp":"2024-05-01T12:00:02Z","pid":11,"operation":"write","target":"~/Documents/save.dat"}"#.to_string(),
    ];
    fs::write(&log, lines.join("\n")).unwrap();

    let sink = MemorySink::new();
    let paths = ConfigPaths::rooted(&root.join("config"), &root.join("data"));
    let engine = MediationEngine::builder(Config::default_config(), paths)
        .home(&home)
        .sink(sink.handle())
        .build()
        .unwrap();
    let session = SessionKey::new("game");
    engine.trust().set(&session, TrustTier::Green);

    let monitor = Monitor::new(Arc::new(engine));
    let report = monitor
        .replay(&ReplayRequest {
            run_id: RunId::new(),
            event_log: log,
            prefix_root: prefix.clone(),
            session,
            executable: None,
        })
        .unwrap();

    assert_eq!(report.skipped_events, 1);
    assert_eq!(report.stats.total_attempts, 3);
    assert_eq!(report.stats.allowed, 1);
    assert_eq!(report.stats.denied, 1);
    assert_eq!(report.stats.redirected, 1);
    assert_eq!(report.metadata.trust_tier, TrustTier::Green);
    assert_eq!(sink.len(), 3);
    assert!(report.chain.intact);
}
