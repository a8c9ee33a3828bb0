//! Twitter destination
//!
//! Media goes through the v1.1 upload endpoint as multipart, tweets through
//! `POST /2/tweets`. Every request carries an OAuth 1.0a user-context header.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::{require, TwitterConfig};
use crate::destinations::Destination;
use crate::error::{PlatformError, Result};
use crate::oauth1::OAuth1Credentials;
use crate::sources::check_status;
use crate::types::{MediaBlob, Outgoing};

pub const TWITTER_CHARACTER_LIMIT: usize = 280;
pub const TWITTER_MAX_IMAGES: usize = 4;
/// Uploads above 3072 KiB are rejected
pub const TWITTER_MAX_IMAGE_BYTES: usize = 3072 * 1024;

#[derive(Deserialize)]
struct UploadResponse {
    media_id_string: String,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

pub struct TwitterClient {
    client: reqwest::Client,
    credentials: OAuth1Credentials,
    api_base: String,
    upload_base: String,
    authenticated: bool,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig, client: reqwest::Client) -> Result<Self> {
        let credentials = OAuth1Credentials::new(
            require(&config.consumer_key, "twitter.consumer_key")?,
            require(&config.consumer_secret, "twitter.consumer_secret")?,
        )
        .with_token(
            require(&config.access_token, "twitter.access_token")?,
            require(&config.access_token_secret, "twitter.access_token_secret")?,
        );

        Ok(Self {
            client,
            credentials,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            authenticated: false,
        })
    }

    async fn upload_media(&self, blob: &MediaBlob) -> Result<String> {
        let url = format!("{}/1.1/media/upload.json", self.upload_base);

        let part = reqwest::multipart::Part::bytes(blob.bytes.clone())
            .file_name(blob.file_name())
            .mime_str(blob.mime_type.as_str())
            .map_err(PlatformError::from)?;
        let form = reqwest::multipart::Form::new().part("media", part);

        tracing::debug!("Uploading {} ({} bytes) to Twitter", blob.source_url, blob.len());

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                self.credentials.authorize("POST", &url, &[]),
            )
            .multipart(form)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Twitter", "media upload", response).await?;
        let upload: UploadResponse = response.json().await.map_err(PlatformError::from)?;

        Ok(upload.media_id_string)
    }
}

/// Inline link url and hashtag after the text
fn plain_text(post: &Outgoing) -> String {
    let mut text = post.text.clone();
    if let Some((_, url)) = &post.link {
        text.push(' ');
        text.push_str(url);
    }
    if let Some(tag) = &post.tag {
        text.push_str(" #");
        text.push_str(tag);
    }
    text
}

#[async_trait]
impl Destination for TwitterClient {
    async fn authenticate(&mut self) -> Result<()> {
        let url = format!("{}/2/users/me", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                self.credentials.authorize("GET", &url, &[]),
            )
            .send()
            .await
            .map_err(PlatformError::from)?;
        check_status("Twitter", "credential check", response).await?;

        self.authenticated = true;
        tracing::debug!("Twitter credentials verified");
        Ok(())
    }

    async fn post(&self, post: &Outgoing) -> Result<String> {
        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        let mut media_ids = Vec::new();
        for blob in post.images.iter().take(TWITTER_MAX_IMAGES) {
            media_ids.push(self.upload_media(blob).await?);
        }

        let mut body = json!({ "text": plain_text(post) });
        if !media_ids.is_empty() {
            body["media"] = json!({ "media_ids": media_ids });
        }

        let url = format!("{}/2/tweets", self.api_base);
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                self.credentials.authorize("POST", &url, &[]),
            )
            .json(&body)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Twitter", "tweet", response).await?;
        let tweet: TweetResponse = response.json().await.map_err(PlatformError::from)?;

        tracing::debug!("Tweeted {}", tweet.data.id);
        Ok(tweet.data.id)
    }

    fn name(&self) -> &str {
        "twitter"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(TWITTER_CHARACTER_LIMIT)
    }

    fn max_attachments(&self) -> usize {
        TWITTER_MAX_IMAGES
    }

    fn max_attachment_size(&self) -> usize {
        TWITTER_MAX_IMAGE_BYTES
    }
}
