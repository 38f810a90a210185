#![deny(clippy::all, clippy::pedantic)]

use assert_cmd::Command;
use httpmock::MockServer;
use predicates::str::contains;
use std::io::Write;
use tempfile::NamedTempFile;

fn token_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tmp file");
    file.write_all(contents.as_bytes()).expect("write token");
    file
}

fn admin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("coherence-admin"));
    cmd.env_remove("COHERENCE_SITE_URL")
        .env_remove("COHERENCE_SESSION_TOKEN")
        .env_remove("COHERENCE_SESSION_TOKEN_FILE")
        .env_remove("COHERENCE_CONFIG_FILE");
    cmd
}

#[test]
fn notification_counts_work_end_to_end() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET")
            .path("/api/notifications/counts")
            .header("authorization", "Bearer cli-token");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"total":9,"unread":3}"#);
    });

    let token = token_file("cli-token\n");
    let assert = admin()
        .env("COHERENCE_SITE_URL", server.base_url())
        .env("COHERENCE_SESSION_TOKEN_FILE", token.path())
        .arg("notifications")
        .arg("counts")
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(output.contains("\"unread\": 3"));
    mock.assert();
}

#[test]
fn ban_with_deletion_runs_cascade_end_to_end() {
    let server = MockServer::start();
    let ban = server.mock(|when, then| {
        when.method("POST").path("/api/admin/users/u1/ban");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":"u1","banned":true}"#);
    });
    let purge = server.mock(|when, then| {
        when.method("DELETE").path("/api/admin/users/u1/messages");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"deleted":2}"#);
    });

    admin()
        .env("COHERENCE_SITE_URL", server.base_url())
        .env("COHERENCE_SESSION_TOKEN", "env-token")
        .args(["ban", "u1", "--reason", "spam", "--delete-messages"])
        .assert()
        .success()
        .stdout(contains("succeeded"));

    ban.assert();
    purge.assert();
}

#[test]
fn partial_cascade_failure_exits_with_cascade_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("POST").path("/api/admin/users/u1/ban");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":"u1","banned":true}"#);
    });
    server.mock(|when, then| {
        when.method("DELETE").path("/api/admin/users/u1/messages");
        then.status(503).body("unavailable");
    });

    admin()
        .env("COHERENCE_SITE_URL", server.base_url())
        .env("COHERENCE_SESSION_TOKEN", "env-token")
        .args(["ban", "u1", "--delete-messages"])
        .assert()
        .code(3)
        .stderr(contains("partially failed at step 1"));
}

#[test]
fn missing_site_fails_fast() {
    admin()
        .env("COHERENCE_SESSION_TOKEN", "env-token")
        .arg("notifications")
        .arg("counts")
        .assert()
        .failure()
        .stderr(contains("site URL is required"));
}

#[test]
fn missing_token_exits_with_session_code() {
    admin()
        .env("COHERENCE_SITE_URL", "http://127.0.0.1:9")
        .arg("notifications")
        .arg("unread")
        .assert()
        .code(77)
        .stderr(contains("session token is required"));
}
