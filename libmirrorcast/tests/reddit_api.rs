//! Reddit adapter against a local mock of the OAuth API

use libmirrorcast::error::{MirrorError, PlatformError};
use libmirrorcast::sources::reddit::{RedditAuth, RedditClient, SubmissionSource, SubredditModerator};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

async fn token_mock(server: &mut ServerGuard) -> Mock {
    server
        .mock("POST", "/api/v1/access_token")
        // base64("id:secret")
        .match_header("authorization", "Basic aWQ6c2VjcmV0")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok", "token_type": "bearer", "expires_in": 3600}"#)
        .create_async()
        .await
}

fn client(server: &ServerGuard) -> RedditClient {
    RedditClient::new(
        reqwest::Client::new(),
        &server.url(),
        &format!("{}/api/v1/access_token", server.url()),
        "id",
        "secret",
        RedditAuth::RefreshToken("refresh".to_string()),
    )
}

async fn authenticated(server: &mut ServerGuard) -> (RedditClient, Mock) {
    let token = token_mock(server).await;
    let mut reddit = client(server);
    reddit.authenticate().await.unwrap();
    (reddit, token)
}

#[tokio::test]
async fn test_authenticate_with_refresh_token() {
    let mut server = Server::new_async().await;
    let token = token_mock(&mut server).await;

    let mut reddit = client(&server);
    assert!(!reddit.is_authenticated());
    reddit.authenticate().await.unwrap();

    assert!(reddit.is_authenticated());
    token.assert_async().await;
}

#[tokio::test]
async fn test_rejected_grant_is_authentication_error() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/api/v1/access_token")
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "invalid_grant"}"#)
        .create_async()
        .await;

    let err = client(&server).authenticate().await.unwrap_err();
    assert!(matches!(err, MirrorError::Platform(PlatformError::Authentication(_))));
    assert!(err.to_string().contains("invalid_grant"));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_hot_listing() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let hot = server
        .mock("GET", "/r/vinesauce/hot")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("limit".into(), "7".into()),
            Matcher::UrlEncoded("raw_json".into(), "1".into()),
        ]))
        .match_header("authorization", "Bearer tok")
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "kind": "Listing",
                "data": {
                    "children": [
                        {"kind": "t3", "data": {
                            "id": "abc", "title": "Fan art", "score": 120,
                            "url": "https://i.imgur.com/x.png", "is_self": false,
                            "link_flair_text": "Art",
                            "permalink": "/r/vinesauce/comments/abc/fan_art/"
                        }},
                        {"kind": "t3", "data": {
                            "id": "def", "title": "Weekly thread", "score": 3,
                            "url": "https://www.reddit.com/r/vinesauce/comments/def/",
                            "is_self": true, "link_flair_text": null, "media": null
                        }}
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let submissions = reddit.hot("vinesauce", 7).await.unwrap();

    hot.assert_async().await;
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].id, "abc");
    assert_eq!(submissions[0].link_flair_text.as_deref(), Some("Art"));
    assert_eq!(submissions[0].shortlink(), "https://redd.it/abc");
    assert!(submissions[1].is_self);
}

#[tokio::test]
async fn test_submit_and_flair() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let submit = server
        .mock("POST", "/api/submit")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("kind".into(), "link".into()),
            Matcher::UrlEncoded("sr".into(), "vinesauce".into()),
            Matcher::UrlEncoded("title".into(), "[Vinny] New Video".into()),
            Matcher::UrlEncoded("url".into(), "https://www.youtube.com/watch?v=xyz".into()),
            Matcher::UrlEncoded("resubmit".into(), "true".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"json": {"errors": [], "data": {"url": "https://www.reddit.com/r/vinesauce/comments/q1/", "id": "q1", "name": "t3_q1"}}}"#,
        )
        .create_async()
        .await;

    let flair = server
        .mock("POST", "/r/vinesauce/api/flair")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("link".into(), "t3_q1".into()),
            Matcher::UrlEncoded("text".into(), "Official Video".into()),
            Matcher::UrlEncoded("css_class".into(), "red".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(r#"{"json": {"errors": []}}"#)
        .create_async()
        .await;

    let link = reddit
        .submit_link("vinesauce", "[Vinny] New Video", "https://www.youtube.com/watch?v=xyz", true)
        .await
        .unwrap();
    assert_eq!(link.id, "q1");
    assert_eq!(link.name, "t3_q1");

    reddit
        .set_link_flair("vinesauce", &link.name, "Official Video", "red")
        .await
        .unwrap();

    submit.assert_async().await;
    flair.assert_async().await;
}

#[tokio::test]
async fn test_submit_already_submitted() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let _submit = server
        .mock("POST", "/api/submit")
        .with_header("content-type", "application/json")
        .with_body(r#"{"json": {"errors": [["ALREADY_SUB", "that link has already been submitted", "url"]]}}"#)
        .create_async()
        .await;

    let err = reddit
        .submit_link("vinesauce", "Title", "https://example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Platform(PlatformError::AlreadySubmitted(_))));
}

#[tokio::test]
async fn test_submit_rate_limited_is_transient() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let _submit = server
        .mock("POST", "/api/submit")
        .with_header("content-type", "application/json")
        .with_body(r#"{"json": {"errors": [["RATELIMIT", "you are doing that too much", "ratelimit"]]}}"#)
        .create_async()
        .await;

    let err = reddit
        .submit_link("vinesauce", "Title", "https://example.com", true)
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

fn widgets_body() -> String {
    json!({
        "items": {
            "widget_streams": {"kind": "textarea", "shortName": "Streams", "text": "old", "height": 24},
            "widget_rules": {"kind": "subreddit-rules", "shortName": "Rules"}
        },
        "layout": {"sidebar": {"order": ["widget_rules", "widget_streams"]}}
    })
    .to_string()
}

#[tokio::test]
async fn test_update_text_widget() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let _list = server
        .mock("GET", "/r/vinesauce/api/widgets")
        .with_header("content-type", "application/json")
        .with_body(widgets_body())
        .create_async()
        .await;

    let update = server
        .mock("PUT", "/r/vinesauce/api/widget/widget_streams")
        .match_header("authorization", "Bearer tok")
        .match_body(Matcher::PartialJson(json!({
            "kind": "textarea",
            "shortName": "Streams",
            "text": "* live",
            "height": 74
        })))
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    reddit
        .update_text_widget("vinesauce", "widget_streams", "* live", 74)
        .await
        .unwrap();

    update.assert_async().await;
}

#[tokio::test]
async fn test_missing_widget_lists_sidebar() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let _list = server
        .mock("GET", "/r/vinesauce/api/widgets")
        .with_header("content-type", "application/json")
        .with_body(widgets_body())
        .create_async()
        .await;

    let err = reddit
        .update_text_widget("vinesauce", "widget_gone", "text", 24)
        .await
        .unwrap_err();

    assert!(matches!(err, MirrorError::Platform(PlatformError::NotFound(_))));
    let message = err.to_string();
    assert!(message.contains("widget_rules - subreddit-rules"));
    assert!(message.contains("widget_streams - textarea"));
}

#[tokio::test]
async fn test_wiki_read_and_edit() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let _read = server
        .mock("GET", "/r/vinesauce/wiki/config/sidebar")
        .match_query(Matcher::UrlEncoded("raw_json".into(), "1".into()))
        .with_header("content-type", "application/json")
        .with_body(r#"{"kind": "wikipage", "data": {"content_md": "sidebar & stuff", "may_revise": true}}"#)
        .create_async()
        .await;

    let edit = server
        .mock("POST", "/r/vinesauce/api/wiki/edit")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "config/sidebar".into()),
            Matcher::UrlEncoded("content".into(), "new sidebar".into()),
        ]))
        .with_body("{}")
        .create_async()
        .await;

    let content = reddit.wiki_page("vinesauce", "config/sidebar").await.unwrap();
    assert_eq!(content, "sidebar & stuff");

    reddit
        .edit_wiki_page("vinesauce", "config/sidebar", "new sidebar", "Update team streams")
        .await
        .unwrap();
    edit.assert_async().await;
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mut server = Server::new_async().await;
    let (reddit, _token) = authenticated(&mut server).await;

    let _hot = server
        .mock("GET", "/r/vinesauce/hot")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let err = reddit.hot("vinesauce", 7).await.unwrap_err();
    assert!(err.is_transient());
}
