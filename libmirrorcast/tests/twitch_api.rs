//! Twitch token, Helix, roster and hosts lookups against a mock server

use libmirrorcast::bots::twitch_status::{collect_statuses, StreamState};
use libmirrorcast::sources::twitch::{HelixClient, HostLookup, TeamRoster, TwitchAuth};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;

const ROSTER: &str = r#"{
    "111": {"channel": {"game": "Old Game", "logo": "https://example.com/vinny.png"}},
    "222": {"channel": {"game": "Tetris"}},
    "333": {"channel": {"game": ""}}
}"#;

async fn app_token(server: &mut ServerGuard) -> TwitchAuth {
    let _token = server
        .mock("POST", "/oauth2/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".into(), "cid".into()),
            Matcher::UrlEncoded("client_secret".into(), "csecret".into()),
            Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "app", "expires_in": 5000000, "token_type": "bearer"}"#)
        .create_async()
        .await;

    TwitchAuth::client_credentials(
        &reqwest::Client::new(),
        &format!("{}/oauth2/token", server.url()),
        "cid",
        "csecret",
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_client_credentials() {
    let mut server = Server::new_async().await;
    let auth = app_token(&mut server).await;

    assert_eq!(auth.client_id, "cid");
    assert_eq!(auth.access_token, "app");
}

#[tokio::test]
async fn test_client_credentials_rejected() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth2/token")
        .with_status(403)
        .with_body(r#"{"status": 403, "message": "invalid client secret"}"#)
        .create_async()
        .await;

    let err = TwitchAuth::client_credentials(
        &reqwest::Client::new(),
        &format!("{}/oauth2/token", server.url()),
        "cid",
        "wrong",
    )
    .await
    .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_collect_statuses_live_hosting_offline() {
    let mut server = Server::new_async().await;
    let auth = app_token(&mut server).await;
    let roster: TeamRoster = serde_json::from_str(ROSTER).unwrap();

    let users = server
        .mock("GET", "/helix/users")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("id".into(), "111".into()),
            Matcher::UrlEncoded("id".into(), "222".into()),
            Matcher::UrlEncoded("id".into(), "333".into()),
        ]))
        .match_header("client-id", "cid")
        .match_header("authorization", "Bearer app")
        .with_header("content-type", "application/json")
        .with_body(
            json!({"data": [
                {"id": "111", "login": "vinny", "display_name": "Vinny"},
                {"id": "222", "login": "joel", "display_name": "Joel"},
                {"id": "333", "login": "rev", "display_name": "Rev"}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let _streams = server
        .mock("GET", "/helix/streams")
        .match_query(Matcher::UrlEncoded("first".into(), "100".into()))
        .with_header("content-type", "application/json")
        .with_body(
            json!({"data": [
                {"user_id": "111", "game_id": "g1", "type": "live", "viewer_count": 900}
            ], "pagination": {}})
            .to_string(),
        )
        .create_async()
        .await;

    let games = server
        .mock("GET", "/helix/games")
        .match_query(Matcher::UrlEncoded("id".into(), "g1".into()))
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"id": "g1", "name": "Mario", "box_art_url": ""}]}).to_string())
        .create_async()
        .await;

    let _joel_hosting = server
        .mock("GET", "/hosts")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("host".into(), "222".into()),
            Matcher::UrlEncoded("include_logins".into(), "1".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"hosts": [{"host_id": 222, "target_id": 444, "target_login": "fred", "target_display_name": "Fred"}]}"#,
        )
        .create_async()
        .await;

    let _rev_not_hosting = server
        .mock("GET", "/hosts")
        .match_query(Matcher::UrlEncoded("host".into(), "333".into()))
        .with_header("content-type", "application/json")
        .with_body(r#"{"hosts": [{"host_id": 333}]}"#)
        .create_async()
        .await;

    let client = reqwest::Client::new();
    let mut helix = HelixClient::new(client.clone(), &format!("{}/helix", server.url()), auth);
    let hosts = HostLookup::new(client, &format!("{}/hosts", server.url()), "cid");

    let statuses = collect_statuses(&mut helix, &roster, Some(&hosts)).await.unwrap();

    users.assert_async().await;
    games.assert_async().await;

    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses[0].login, "vinny");
    assert_eq!(
        statuses[0].state,
        StreamState::Live {
            viewers: 900,
            game: "Mario".to_string()
        }
    );
    assert_eq!(
        statuses[1].state,
        StreamState::Hosting {
            target: "Fred".to_string()
        }
    );
    assert_eq!(statuses[2].login, "rev");
    assert_eq!(
        statuses[2].state,
        StreamState::Offline {
            last_game: String::new()
        }
    );
}

#[tokio::test]
async fn test_host_lookup_failure_reads_as_not_hosting() {
    let mut server = Server::new_async().await;
    let _hosts = server
        .mock("GET", "/hosts")
        .match_query(Matcher::Any)
        .with_status(410)
        .with_body("gone")
        .create_async()
        .await;

    let hosts = HostLookup::new(reqwest::Client::new(), &format!("{}/hosts", server.url()), "cid");
    assert_eq!(hosts.target("222").await, None);
}

#[tokio::test]
async fn test_roster_download_refreshes_cache() {
    let mut server = Server::new_async().await;
    let _team = server
        .mock("GET", "/team.json")
        .with_header("content-type", "application/json")
        .with_body(ROSTER)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("team.json");

    let roster = TeamRoster::fetch(
        &reqwest::Client::new(),
        &format!("{}/team.json", server.url()),
        Some(cache.as_path()),
    )
    .await
    .unwrap();

    assert_eq!(roster.ids(), vec!["111", "222", "333"]);
    assert_eq!(roster.last_game("222"), Some("Tetris"));
    assert_eq!(TeamRoster::load_cache(&cache).unwrap(), roster);
}

#[tokio::test]
async fn test_roster_falls_back_to_cache() {
    let mut server = Server::new_async().await;
    let _team = server
        .mock("GET", "/team.json")
        .with_status(500)
        .with_body("oops")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("team.json");
    std::fs::write(&cache, ROSTER).unwrap();

    let url = format!("{}/team.json", server.url());
    let roster = TeamRoster::fetch(&reqwest::Client::new(), &url, Some(cache.as_path()))
        .await
        .unwrap();
    assert_eq!(roster.members.len(), 3);

    let no_cache = TeamRoster::fetch(&reqwest::Client::new(), &url, None).await;
    assert!(no_cache.is_err());
}
