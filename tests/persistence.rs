//! Round trips through the filesystem: transcripts, configuration and
//! directive passage files.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use facility_audit::agent::{
    AuditPlanner, AuditSession, Controller, InMemoryCollaborators, SessionError, SessionStatus,
};
use facility_audit::clock::FixedClock;
use facility_audit::collab::{DirectiveIndex, Retrieval};
use facility_audit::config::{AuditConfig, ConfigError};
use facility_audit::paths::AuditPaths;
use facility_audit::store::MemStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

fn audited_session() -> AuditSession {
    let collab = InMemoryCollaborators::seeded(now());
    let clock = Arc::new(FixedClock(now()));
    let planner = AuditPlanner::new("officer@petrolab.example", 30, clock.clone());
    Controller::with_builtins(Arc::new(planner), collab.context(clock))
        .unwrap()
        .run("Audit FAC-AB-001")
}

#[test]
fn transcript_survives_save_and_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = AuditPaths::under(dir.path());
    paths.ensure_dirs().unwrap();

    let session = audited_session();
    let file = paths.sessions_dir().join(session.file_name());
    session.save(&file).unwrap();

    let loaded = AuditSession::load(&file).unwrap();
    assert_eq!(loaded, session);
    assert_eq!(loaded.status, SessionStatus::Completed);
    assert_eq!(loaded.steps.len(), 7);
    assert_eq!(loaded.render(), session.render());
}

#[test]
fn save_creates_missing_directories() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("nested/deeper/session.json");
    audited_session().save(&file).unwrap();
    assert!(file.is_file());
}

#[test]
fn corrupt_transcript_is_a_parse_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("bad.json");
    std::fs::write(&file, "{ \"goal\": 3 }").unwrap();
    assert!(matches!(
        AuditSession::load(&file),
        Err(SessionError::Parse { .. })
    ));
    assert!(matches!(
        AuditSession::load(&dir.path().join("missing.json")),
        Err(SessionError::Read { .. })
    ));
}

#[test]
fn config_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let config = AuditConfig {
        iteration_cap: 9,
        notify_recipient: "audits@example.org".into(),
        directives_path: Some(dir.path().join("directives.toml")),
        ..Default::default()
    };
    config.save(&path).unwrap();

    let loaded = AuditConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let loaded = AuditConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, AuditConfig::default());
}

#[test]
fn invalid_config_is_rejected_on_load() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "iteration_cap = 0\n").unwrap();
    assert!(matches!(
        AuditConfig::load(&path),
        Err(ConfigError::Invalid { .. })
    ));

    std::fs::write(&path, "iteration_cap = \"many\"\n").unwrap();
    assert!(matches!(
        AuditConfig::load(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn custom_directives_drive_the_audit_report() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("directives.toml");
    std::fs::write(
        &path,
        r#"
[[passage]]
text = "All measurement equipment requires calibration every 365 days."
source = "Site Standard 12"
"#,
    )
    .unwrap();

    let index = DirectiveIndex::load(&path).unwrap();
    assert_eq!(index.query("calibration frequency", 3).unwrap().len(), 1);

    let collab = InMemoryCollaborators::with_directives(MemStore::seeded(now()), index);
    let clock = Arc::new(FixedClock(now()));
    let planner = AuditPlanner::new("officer@petrolab.example", 30, clock.clone());
    let session = Controller::with_builtins(Arc::new(planner), collab.context(clock))
        .unwrap()
        .run("Audit FAC-AB-001");

    assert_eq!(session.status, SessionStatus::Completed);
    let sent = collab.outbox.sent();
    assert!(sent[0].body.contains("Site Standard 12"));
}
