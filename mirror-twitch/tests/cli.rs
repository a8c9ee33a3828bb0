//! CLI integration tests for mirror-twitch

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CREDENTIAL_VARS: &[&str] = &[
    "REDDIT_CLIENT_ID",
    "REDDIT_CLIENT_SECRET",
    "REDDIT_REFRESH_TOKEN",
    "REDDIT_USERNAME",
    "REDDIT_PASSWORD",
    "DATABASE_PATH",
    "TWITCH_ID",
    "TWITCH_SECRET",
];

fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config with a temp database and no twitch credentials
fn setup_config() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mirrorcast.db");
    let config_path = temp_dir.path().join("config.toml");

    fs::write(
        &config_path,
        format!(
            "[database]\npath = \"{}\"\n\n[twitch]\nsubreddit = \"vinesauce\"\n",
            escape_path_for_toml(&db_path.to_string_lossy())
        ),
    )
    .unwrap();

    let config_path = config_path.to_string_lossy().to_string();
    (temp_dir, config_path)
}

fn command() -> Command {
    let mut cmd = Command::cargo_bin("mirror-twitch").unwrap();
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_flag_output() {
    command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Keep a subreddit sidebar in sync with a Twitch team's streams"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--watch"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_version_flag_output() {
    command()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mirror-twitch"));
}

#[test]
fn test_rejects_bad_watch_interval() {
    command()
        .args(["--watch", "whenever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid interval"));

    command()
        .args(["--watch", "0s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("greater than zero"));
}

#[test]
fn test_rejects_bad_log_format() {
    command()
        .args(["--log-format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log format"));
}

#[test]
fn test_missing_twitch_credentials_exit_code() {
    let (_temp_dir, config_path) = setup_config();

    command()
        .args(["--config", &config_path, "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing required field: twitch.client_id"));
}

#[test]
fn test_missing_config_file_exit_code() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    command()
        .arg("--config")
        .arg(&missing)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}
