//! CLI integration tests for mirror-auth

use assert_cmd::Command;
use mockito::Matcher;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn command() -> Command {
    let mut cmd = Command::cargo_bin("mirror-auth").unwrap();
    cmd.env_remove("TWITTER_CONSUMER_TOKEN")
        .env_remove("TWITTER_CONSUMER_SECRET");
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_help_flag_output() {
    command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("OAuth PIN flow"))
        .stdout(predicate::str::contains("--consumer-key"))
        .stdout(predicate::str::contains("--consumer-secret"));
}

#[test]
fn test_missing_consumer_key() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, "[twitter]\napi_base = \"http://127.0.0.1:9\"\n");

    command()
        .args(["--config", &config_path])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Missing required field: twitter.consumer_key"));
}

#[test]
fn test_pin_flow_prints_access_tokens() {
    let mut server = mockito::Server::new();
    let request = server
        .mock("POST", "/oauth/request_token")
        .match_header("authorization", Matcher::Regex(r#"oauth_callback="oob""#.to_string()))
        .with_body("oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true")
        .create();
    let access = server
        .mock("POST", "/oauth/access_token")
        .match_header(
            "authorization",
            Matcher::AllOf(vec![
                Matcher::Regex(r#"oauth_token="req-token""#.to_string()),
                Matcher::Regex(r#"oauth_verifier="1234""#.to_string()),
            ]),
        )
        .with_body("oauth_token=42-access&oauth_token_secret=access-secret&user_id=42&screen_name=vinebot")
        .create();

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &format!("[twitter]\napi_base = \"{}\"\n", server.url()));

    command()
        .args(["--config", &config_path])
        .args(["--consumer-key", "ck", "--consumer-secret", "cs"])
        .write_stdin("1234\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("/oauth/authorize?oauth_token=req-token"))
        .stdout(predicate::str::contains("[twitter]"))
        .stdout(predicate::str::contains("access_token = \"42-access\""))
        .stdout(predicate::str::contains("access_token_secret = \"access-secret\""));

    request.assert();
    access.assert();
}

#[test]
fn test_empty_pin_is_invalid_input() {
    let mut server = mockito::Server::new();
    let _request = server
        .mock("POST", "/oauth/request_token")
        .with_body("oauth_token=req-token&oauth_token_secret=req-secret")
        .create();
    let access = server.mock("POST", "/oauth/access_token").expect(0).create();

    let dir = TempDir::new().unwrap();
    let config_path = write_config(
        &dir,
        &format!(
            "[twitter]\napi_base = \"{}\"\nconsumer_key = \"ck\"\nconsumer_secret = \"cs\"\n",
            server.url()
        ),
    );

    command()
        .args(["--config", &config_path])
        .write_stdin("\n")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No PIN entered"));

    access.assert();
}

#[test]
fn test_rejected_consumer_key() {
    let mut server = mockito::Server::new();
    let _request = server
        .mock("POST", "/oauth/request_token")
        .with_status(401)
        .with_body("Could not authenticate you.")
        .create();

    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir, &format!("[twitter]\napi_base = \"{}\"\n", server.url()));

    command()
        .args(["--config", &config_path])
        .args(["--consumer-key", "ck", "--consumer-secret", "cs"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Authentication failed"));
}
