mod common;

use std::path::PathBuf;

use common::{attempt, Fixture};
use policy_engine::DecisionAction;
use winewarden_core::ids::SessionKey;
use winewarden_core::paths::Zone;
use winewarden_core::trust::TrustTier;
use winewarden_core::types::Operation;

#[test]
fn test_prefix_write_allowed_for_green() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Green);

    let result = engine
        .mediate(attempt(1, Operation::Write, fixture.in_prefix("drive_c/save.dat")), &ctx)
        .unwrap();
    assert_eq!(result.decision.action, DecisionAction::Allow);
    assert_eq!(result.decision.rule_id, "prefix_internal_green");
    assert_eq!(result.record.zone, Zone::PrefixInternal);
    assert!(!result.decision.systemic_risk);
}

#[test]
fn test_credentials_denied_at_every_tier() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);

    for tier in TrustTier::ALL {
        engine.trust().set(&ctx.session, tier);
        let result = engine
            .mediate(attempt(1, Operation::Read, "~/.ssh/id_rsa"), &ctx)
            .unwrap();
        assert_eq!(result.decision.action, DecisionAction::Deny);
        assert_eq!(result.decision.rationale, "sacred_zone:credential");
        assert!(result.decision.systemic_risk);
        assert_eq!(result.record.canonical_target, fixture.in_home(".ssh/id_rsa"));
    }
}

#[test]
fn test_home_write_redirected_into_shadow() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Yellow);

    let result = engine
        .mediate(attempt(1, Operation::Write, "~/Documents/save.dat"), &ctx)
        .unwrap();
    assert_eq!(
        result.decision.action,
        DecisionAction::Redirect {
            target_path: fixture.prefix.join("shadow/Documents/save.dat")
        }
    );
    assert_eq!(result.record.zone, Zone::SacredHome);
}

#[test]
fn test_pulse_socket_explicitly_allowed() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Green);

    let result = engine
        .mediate(attempt(1, Operation::Connect, "/run/user/1000/pulse/native"), &ctx)
        .unwrap();
    assert_eq!(result.decision.action, DecisionAction::Allow);
    assert_eq!(result.decision.rule_id, "pulse_audio_socket");

    let bus = engine
        .mediate(attempt(1, Operation::Connect, "/run/user/1000/bus"), &ctx)
        .unwrap();
    assert_eq!(bus.decision.action, DecisionAction::Deny);
    assert_eq!(bus.decision.rationale, "sacred_zone:system_socket");
}

#[test]
fn test_unmatched_system_config_read_under_red_denied() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Red);

    let result = engine
        .mediate(attempt(1, Operation::Read, "/etc/passwd"), &ctx)
        .unwrap();
    assert_eq!(result.decision.action, DecisionAction::Deny);
    assert_eq!(result.decision.rule_id, "no_match");
    assert_eq!(result.decision.rationale, "no matching rule");
    assert_eq!(result.record.zone, Zone::SacredSystemConfig);
}

#[test]
fn test_windows_spelling_converges_on_real_path() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);

    let result = engine
        .mediate(
            attempt(1, Operation::Write, r"c:\USERS\SteamUser\documents\profile.sav"),
            &ctx,
        )
        .unwrap();
    assert_eq!(result.record.zone, Zone::PrefixInternal);
    assert_eq!(
        PathBuf::from(&result.record.canonical_target),
        fixture.prefix.join("drive_c/users/steamuser/Documents/profile.sav")
    );
}

#[test]
fn test_escapes_out_of_prefix_are_caught() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Green);

    let z_drive = format!("Z:{}", fixture.in_home(".ssh/id_rsa")).replace('/', "\\");
    let escapes = [
        fixture.in_prefix("drive_c/link_out/id_rsa"),
        fixture.in_prefix("drive_c/../../../.ssh/id_rsa"),
        r"C:\link_out\id_rsa".to_string(),
        z_drive,
    ];
    for raw in escapes {
        let result = engine.mediate(attempt(1, Operation::Read, raw.as_str()), &ctx).unwrap();
        assert_eq!(result.record.zone, Zone::SacredCredential, "{raw}");
        assert_eq!(result.decision.action, DecisionAction::Deny, "{raw}");
        assert_eq!(result.record.canonical_target, fixture.in_home(".ssh/id_rsa"), "{raw}");
    }
}

#[test]
fn test_symlink_loop_fails_closed() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Green);

    let result = engine
        .mediate(attempt(1, Operation::Read, fixture.in_prefix("drive_c/loop_a/file")), &ctx)
        .unwrap();
    assert_eq!(result.decision.action, DecisionAction::Deny);
    assert_eq!(result.decision.rule_id, "no_match");
    assert_eq!(result.record.zone, Zone::Unclassified);
    assert!(result
        .record
        .classification_note
        .as_deref()
        .is_some_and(|note| note.contains("symlink")));
}

#[test]
fn test_network_identifiers_are_unclassified() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);

    let result = engine
        .mediate(attempt(1, Operation::Connect, "tcp:203.0.113.7:443"), &ctx)
        .unwrap();
    assert_eq!(result.record.zone, Zone::Unclassified);
    assert_eq!(result.record.canonical_target, "tcp:203.0.113.7:443");
    assert_eq!(result.decision.rule_id, "network_outbound");
}

#[test]
fn test_stowed_credential_dir_stays_sacred() {
    let fixture = Fixture::new();
    let stowed = fixture.root.join("dotfiles/ssh");
    std::fs::create_dir_all(&stowed).unwrap();
    std::fs::write(stowed.join("id_rsa"), b"secret").unwrap();
    std::fs::remove_dir_all(fixture.home.join(".ssh")).unwrap();
    std::os::unix::fs::symlink(&stowed, fixture.home.join(".ssh")).unwrap();

    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Green);

    for raw in [
        "~/.ssh/id_rsa".to_string(),
        fixture.in_prefix("drive_c/link_out/id_rsa"),
    ] {
        let result = engine.mediate(attempt(1, Operation::Read, raw.as_str()), &ctx).unwrap();
        assert_eq!(result.record.zone, Zone::SacredCredential, "{raw}");
        assert_eq!(result.decision.action, DecisionAction::Deny, "{raw}");
        assert_eq!(result.record.canonical_target, fixture.in_home(".ssh/id_rsa"), "{raw}");
    }
}

#[test]
fn test_file_urls_are_classified_as_paths() {
    let fixture = Fixture::new();
    let (engine, _) = fixture.default_engine();
    let ctx = engine.context(SessionKey::new("game"), &fixture.prefix);
    engine.trust().set(&ctx.session, TrustTier::Green);

    let target = format!("file://{}", fixture.in_home(".gnupg/secring.gpg"));
    let result = engine.mediate(attempt(1, Operation::Read, target.as_str()), &ctx).unwrap();
    assert_eq!(result.record.zone, Zone::SacredCredential);
    assert_eq!(result.decision.action, DecisionAction::Deny);

    let unknown = engine
        .mediate(attempt(1, Operation::Read, "smb:fileserver/share/notes.txt"), &ctx)
        .unwrap();
    assert_eq!(unknown.record.zone, Zone::Unclassified);
    assert_eq!(unknown.decision.rule_id, "no_match");
    assert!(unknown.record.classification_note.is_some());
}
