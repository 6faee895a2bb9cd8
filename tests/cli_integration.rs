//! CLI integration tests
//!
//! These tests run the compiled binary against a temporary SQLite database and check
//! parsing, exit codes and output. None of them reach the network.

use repoaudit::pipeline::{AnalysisJob, DocType};
use repoaudit::source::RepoCoordinates;
use repoaudit::store::{Document, Repository, SqliteStore, Store};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn repoaudit_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_repoaudit"))
}

fn run(db: &Path, args: &[&str]) -> Output {
    Command::new(repoaudit_bin())
        .args(args)
        .env("REPOAUDIT_DATABASE", db)
        .env("REPOAUDIT_LOG_LEVEL", "error")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute repoaudit")
}

#[test]
fn test_cli_help() {
    let output = Command::new(repoaudit_bin())
        .arg("--help")
        .output()
        .expect("Failed to execute repoaudit");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("analyze"));
    assert!(stdout.contains("show"));
}

#[test]
fn test_cli_version() {
    let output = Command::new(repoaudit_bin())
        .arg("--version")
        .output()
        .expect("Failed to execute repoaudit");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_analyze_rejects_malformed_repository() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir.path().join("db.sqlite"), &["analyze", "not-a-repo", "--files", "a.rs"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("owner/name"));
}

#[test]
fn test_analyze_fails_on_invalid_configuration() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(repoaudit_bin())
        .args(["analyze", "acme/widgets", "--files", "src/lib.rs"])
        .env("REPOAUDIT_DATABASE", dir.path().join("db.sqlite"))
        .env("REPOAUDIT_REQUEST_TIMEOUT", "0")
        .output()
        .expect("Failed to execute repoaudit");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration validation failed"));
}

#[test]
fn test_unparsable_setting_is_reported() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(repoaudit_bin())
        .args(["show", "x"])
        .env("REPOAUDIT_DATABASE", dir.path().join("db.sqlite"))
        .env("REPOAUDIT_JOB_TIMEOUT", "soon")
        .output()
        .expect("Failed to execute repoaudit");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to parse REPOAUDIT_JOB_TIMEOUT"));
}

#[test]
fn test_show_unknown_analysis() {
    let dir = TempDir::new().unwrap();
    let output = run(&dir.path().join("db.sqlite"), &["show", "does-not-exist"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[tokio::test]
async fn test_show_prints_stored_job_as_json() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("db.sqlite");
    {
        let store = SqliteStore::connect(&db).await.unwrap();
        store.migrate().await.unwrap();
        store
            .upsert_repository(&Repository {
                id: "acme/widgets".into(),
                owner_id: "local".into(),
                coordinates: RepoCoordinates::new("acme", "widgets"),
                default_branch: "main".into(),
            })
            .await
            .unwrap();
        store
            .create_job(&AnalysisJob::new("a-1", "acme/widgets", "local"))
            .await
            .unwrap();
        store
            .set_commit("a-1", "abcdef0123456789")
            .await
            .unwrap();
        store
            .upsert_document(&Document::new("acme/widgets", "abcdef0", DocType::Readme, "# Widgets"))
            .await
            .unwrap();
    }

    let output = tokio::task::spawn_blocking(move || run(&db, &["show", "a-1"]))
        .await
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["analysis"]["id"], "a-1");
    assert_eq!(parsed["analysis"]["status"], "NEW");
    assert_eq!(parsed["documents"][0]["docType"], "README");
}
