//! Reddit API adapter
//!
//! Covers the handful of endpoints the bots touch: reading a subreddit's hot
//! listing, submitting links, flairing them, and editing sidebar widgets and
//! wiki pages. All calls go through OAuth (`oauth.reddit.com`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::config::{require, RedditConfig};
use crate::error::{ConfigError, PlatformError, Result};
use crate::sources::check_status;
use crate::types::Submission;

/// Reads submissions from a subreddit
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    async fn hot(&self, subreddit: &str, limit: usize) -> Result<Vec<Submission>>;
}

/// Writes to a subreddit as a moderator
#[async_trait]
pub trait SubredditModerator: Send + Sync {
    async fn submit_link(
        &self,
        subreddit: &str,
        title: &str,
        url: &str,
        resubmit: bool,
    ) -> Result<SubmittedLink>;

    async fn set_link_flair(
        &self,
        subreddit: &str,
        fullname: &str,
        text: &str,
        css_class: &str,
    ) -> Result<()>;

    /// Replace the text and height of an existing sidebar widget
    async fn update_text_widget(
        &self,
        subreddit: &str,
        widget_id: &str,
        text: &str,
        height: u32,
    ) -> Result<()>;

    async fn wiki_page(&self, subreddit: &str, page: &str) -> Result<String>;

    async fn edit_wiki_page(
        &self,
        subreddit: &str,
        page: &str,
        content: &str,
        reason: &str,
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmittedLink {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl SubmittedLink {
    /// `t3_` fullname used by the flair endpoint
    pub fn fullname(&self) -> String {
        if self.name.is_empty() {
            format!("t3_{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub enum RedditAuth {
    RefreshToken(String),
    Password { username: String, password: String },
}

#[derive(Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
}

#[derive(Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Deserialize)]
struct WikiPage {
    content_md: String,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    json: ApiResponse,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    #[serde(default)]
    data: Option<SubmittedLink>,
}

/// Sidebar widgets of a subreddit, keyed by widget id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Widgets {
    #[serde(default)]
    pub items: HashMap<String, Value>,
    #[serde(default)]
    pub layout: WidgetLayout,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetLayout {
    #[serde(default)]
    pub sidebar: WidgetOrder,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetOrder {
    #[serde(default)]
    pub order: Vec<String>,
}

impl Widgets {
    /// `id - kind` for every sidebar widget, in display order
    pub fn describe_sidebar(&self) -> Vec<String> {
        self.layout
            .sidebar
            .order
            .iter()
            .map(|id| {
                let kind = self
                    .items
                    .get(id)
                    .and_then(|w| w.get("kind"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                format!("{} - {}", id, kind)
            })
            .collect()
    }
}

/// Map Reddit's `json.errors` triples onto a `PlatformError`
fn map_api_errors(context: &str, errors: &[Vec<Value>]) -> Option<PlatformError> {
    let first = errors.first()?;
    let code = first.first().and_then(Value::as_str).unwrap_or("UNKNOWN");
    let message = first.get(1).and_then(Value::as_str).unwrap_or_default();
    let detail = format!("Reddit {} failed: {} ({})", context, code, message);

    Some(match code {
        "ALREADY_SUB" => PlatformError::AlreadySubmitted(detail),
        "RATELIMIT" => PlatformError::RateLimit(detail),
        "USER_REQUIRED" | "NOT_AUTHORIZED" => PlatformError::Authentication(detail),
        _ => PlatformError::Posting(detail),
    })
}

pub struct RedditClient {
    client: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    auth: RedditAuth,
    access_token: Option<String>,
}

impl RedditClient {
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        auth: RedditAuth,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth,
            access_token: None,
        }
    }

    /// Build a client from `[reddit]`, preferring a refresh token over a password
    pub fn from_config(config: &RedditConfig, client: reqwest::Client) -> Result<Self> {
        let client_id = require(&config.client_id, "reddit.client_id")?;

        let auth = match (&config.refresh_token, &config.username, &config.password) {
            (Some(token), _, _) => RedditAuth::RefreshToken(token.clone()),
            (None, Some(username), Some(password)) => RedditAuth::Password {
                username: username.clone(),
                password: password.clone(),
            },
            _ => {
                return Err(ConfigError::MissingField(
                    "reddit.refresh_token (or reddit.username + reddit.password)".to_string(),
                )
                .into())
            }
        };

        Ok(Self::new(
            client,
            &config.api_base,
            &config.token_url,
            client_id,
            &config.client_secret,
            auth,
        ))
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Exchange the configured grant for a bearer token
    pub async fn authenticate(&mut self) -> Result<()> {
        let form: Vec<(&str, &str)> = match &self.auth {
            RedditAuth::RefreshToken(token) => {
                vec![("grant_type", "refresh_token"), ("refresh_token", token)]
            }
            RedditAuth::Password { username, password } => vec![
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ],
        };

        tracing::debug!("Requesting Reddit access token");

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Reddit", "token exchange", response).await?;
        let body: Value = response.json().await.map_err(PlatformError::from)?;

        // Reddit reports bad grants as 200 + {"error": "..."}
        match body.get("access_token").and_then(Value::as_str) {
            Some(token) => {
                self.access_token = Some(token.to_string());
                tracing::debug!("Reddit session ready");
                Ok(())
            }
            None => {
                let reason = body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("no access_token in response");
                Err(PlatformError::Authentication(format!(
                    "Reddit token exchange failed: {}",
                    reason
                ))
                .into())
            }
        }
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| PlatformError::Authentication("Reddit client not authenticated".to_string()).into())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Reddit", context, response).await?;
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    async fn post_form(&self, path: &str, context: &str, form: &[(&str, &str)]) -> Result<ApiResponse> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.token()?)
            .form(form)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Reddit", context, response).await?;
        let envelope: ApiEnvelope = response.json().await.map_err(PlatformError::from)?;

        if let Some(error) = map_api_errors(context, &envelope.json.errors) {
            return Err(error.into());
        }
        Ok(envelope.json)
    }

    pub async fn sidebar_widgets(&self, subreddit: &str) -> Result<Widgets> {
        self.get_json(&format!("/r/{}/api/widgets", subreddit), "widget listing")
            .await
    }
}

#[async_trait]
impl SubmissionSource for RedditClient {
    async fn hot(&self, subreddit: &str, limit: usize) -> Result<Vec<Submission>> {
        let listing: Listing<Submission> = self
            .get_json(
                &format!("/r/{}/hot?limit={}&raw_json=1", subreddit, limit),
                "hot listing",
            )
            .await?;

        let submissions: Vec<Submission> = listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data)
            .take(limit)
            .collect();

        tracing::debug!("Fetched {} hot submissions from r/{}", submissions.len(), subreddit);
        Ok(submissions)
    }
}

#[async_trait]
impl SubredditModerator for RedditClient {
    async fn submit_link(
        &self,
        subreddit: &str,
        title: &str,
        url: &str,
        resubmit: bool,
    ) -> Result<SubmittedLink> {
        let resubmit = if resubmit { "true" } else { "false" };
        let response = self
            .post_form(
                "/api/submit",
                "submit",
                &[
                    ("api_type", "json"),
                    ("kind", "link"),
                    ("sr", subreddit),
                    ("title", title),
                    ("url", url),
                    ("resubmit", resubmit),
                ],
            )
            .await?;

        response.data.ok_or_else(|| {
            PlatformError::Posting("Reddit submit returned no submission data".to_string()).into()
        })
    }

    async fn set_link_flair(
        &self,
        subreddit: &str,
        fullname: &str,
        text: &str,
        css_class: &str,
    ) -> Result<()> {
        self.post_form(
            &format!("/r/{}/api/flair", subreddit),
            "flair",
            &[
                ("api_type", "json"),
                ("link", fullname),
                ("text", text),
                ("css_class", css_class),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_text_widget(
        &self,
        subreddit: &str,
        widget_id: &str,
        text: &str,
        height: u32,
    ) -> Result<()> {
        let widgets = self.sidebar_widgets(subreddit).await?;

        let Some(mut widget) = widgets.items.get(widget_id).cloned() else {
            return Err(PlatformError::NotFound(format!(
                "Widget {} not found on r/{}. Available: [{}]",
                widget_id,
                subreddit,
                widgets.describe_sidebar().join(", ")
            ))
            .into());
        };

        if let Some(object) = widget.as_object_mut() {
            object.insert("text".to_string(), Value::from(text));
            object.insert("height".to_string(), Value::from(height));
        }

        let response = self
            .client
            .put(self.url(&format!("/r/{}/api/widget/{}", subreddit, widget_id)))
            .bearer_auth(self.token()?)
            .json(&widget)
            .send()
            .await
            .map_err(PlatformError::from)?;
        check_status("Reddit", "widget update", response).await?;

        Ok(())
    }

    async fn wiki_page(&self, subreddit: &str, page: &str) -> Result<String> {
        let thing: Thing<WikiPage> = self
            .get_json(&format!("/r/{}/wiki/{}?raw_json=1", subreddit, page), "wiki read")
            .await?;
        Ok(thing.data.content_md)
    }

    async fn edit_wiki_page(
        &self,
        subreddit: &str,
        page: &str,
        content: &str,
        reason: &str,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/r/{}/api/wiki/edit", subreddit)))
            .bearer_auth(self.token()?)
            .form(&[("page", page), ("content", content), ("reason", reason)])
            .send()
            .await
            .map_err(PlatformError::from)?;
        check_status("Reddit", "wiki edit", response).await?;
        Ok(())
    }
}
