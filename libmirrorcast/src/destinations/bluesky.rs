//! Bluesky destination over raw XRPC
//!
//! Sessions come from `com.atproto.server.createSession`, images and link
//! thumbnails go through `com.atproto.repo.uploadBlob`, and the post itself is
//! an `app.bsky.feed.post` record written with `com.atproto.repo.createRecord`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{require, BlueskyConfig};
use crate::destinations::Destination;
use crate::error::{PlatformError, Result};
use crate::types::{ExternalEmbed, MediaBlob, Outgoing};

pub const BLUESKY_CHARACTER_LIMIT: usize = 300;
pub const BLUESKY_MAX_IMAGES: usize = 4;
pub const BLUESKY_MAX_IMAGE_BYTES: usize = 1_000_000;

/// Separator between the link and the tag
const FACET_SEPARATOR: &str = " • ";

/// Error body returned by a failed XRPC call
#[derive(Debug, Default, Deserialize)]
struct XrpcError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Map a failed XRPC response to PlatformError
///
/// The `error` name in the body (`ExpiredToken`, `RateLimitExceeded`, ...)
/// decides the category. The HTTP status is only used when the body does not
/// name a known error, and the free-text `message` is never inspected.
fn map_xrpc_error(status: u16, body: &str, context: &str) -> PlatformError {
    let xrpc: XrpcError = serde_json::from_str(body).unwrap_or_default();
    let detail = match (xrpc.error.is_empty(), xrpc.message.is_empty()) {
        (true, _) => format!("HTTP {}: {}", status, body.trim()),
        (false, true) => format!("HTTP {}: {}", status, xrpc.error),
        (false, false) => format!("HTTP {}: {}: {}", status, xrpc.error, xrpc.message),
    };

    let auth_failed = || {
        PlatformError::Authentication(format!(
            "Bluesky authentication failed during {}: {}",
            context, detail
        ))
    };

    match xrpc.error.as_str() {
        "AuthenticationRequired" | "InvalidToken" | "ExpiredToken" | "AuthFactorTokenRequired" => {
            auth_failed()
        }
        "InvalidCredentials" | "AccountNotFound" | "AccountTakedown" => {
            PlatformError::Authentication(format!(
                "Invalid Bluesky credentials: {}. Check the handle and app password.",
                detail
            ))
        }
        "RateLimitExceeded" => PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}",
            context, detail
        )),
        "InvalidRequest" | "InvalidRecord" | "BlobTooLarge" | "InvalidMimeType" | "InvalidSwap" => {
            PlatformError::Validation(format!(
                "Bluesky rejected the request during {}: {}",
                context, detail
            ))
        }
        _ => match status {
            401 | 403 => auth_failed(),
            429 => PlatformError::RateLimit(format!(
                "Bluesky rate limit exceeded during {}: {}",
                context, detail
            )),
            400 | 413 | 422 => PlatformError::Validation(format!(
                "Bluesky rejected the request during {}: {}",
                context, detail
            )),
            500..=599 => PlatformError::Network(format!(
                "Bluesky PDS error during {}: {}",
                context, detail
            )),
            _ => PlatformError::Posting(format!(
                "Bluesky operation failed during {}: {}",
                context, detail
            )),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// Builds post text and facets together; offsets are UTF-8 byte positions
#[derive(Debug, Default)]
pub struct RichTextBuilder {
    text: String,
    facets: Vec<Facet>,
}

impl RichTextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text.push_str(text);
        self
    }

    fn feature(mut self, display: &str, feature: FacetFeature) -> Self {
        let byte_start = self.text.len();
        self.text.push_str(display);
        self.facets.push(Facet {
            index: ByteSlice {
                byte_start,
                byte_end: self.text.len(),
            },
            features: vec![feature],
        });
        self
    }

    pub fn link(self, label: &str, uri: &str) -> Self {
        self.feature(label, FacetFeature::Link { uri: uri.to_string() })
    }

    /// Append `#tag` linked to the tag feed
    pub fn tag(self, tag: &str) -> Self {
        let display = format!("#{}", tag);
        self.feature(&display, FacetFeature::Tag { tag: tag.to_string() })
    }

    pub fn build(self) -> (String, Vec<Facet>) {
        (self.text, self.facets)
    }
}

/// Text plus link and tag facets, in the order `text`, link, separator, tag
pub fn render_rich_text(post: &Outgoing) -> (String, Vec<Facet>) {
    let mut builder = RichTextBuilder::new().text(&post.text);
    if let Some((label, uri)) = &post.link {
        builder = builder.link(label, uri);
    }
    if let Some(tag) = &post.tag {
        if post.link.is_some() {
            builder = builder.text(FACET_SEPARATOR);
        }
        builder = builder.tag(tag);
    }
    builder.build()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: Value,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

pub struct BlueskyClient {
    client: reqwest::Client,
    pds: String,
    handle: String,
    app_password: String,
    session: Option<Session>,
}

impl BlueskyClient {
    pub fn new(config: &BlueskyConfig, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            pds: config.pds.trim_end_matches('/').to_string(),
            handle: require(&config.username, "bluesky.username")?.to_string(),
            app_password: require(&config.password, "bluesky.password")?.to_string(),
            session: None,
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.pds, method)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| PlatformError::Authentication("Not authenticated".to_string()).into())
    }

    /// Send an XRPC request, mapping transport and status failures
    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(PlatformError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_xrpc_error(status.as_u16(), &body, context).into())
    }

    async fn create_session(&mut self) -> Result<()> {
        tracing::debug!("Creating Bluesky session for handle: {}", self.handle);

        let request = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({ "identifier": self.handle, "password": self.app_password }));
        let response = self.send(request, "authentication").await?;
        let session: Session = response
            .json()
            .await
            .map_err(PlatformError::from)?;

        tracing::debug!("Bluesky session created for {}", session.did);
        self.session = Some(session);
        Ok(())
    }

    async fn upload_blob(&self, blob: &MediaBlob) -> Result<Value> {
        let session = self.session()?;

        tracing::debug!("Uploading {} ({} bytes) to Bluesky", blob.source_url, blob.len());

        let request = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, blob.mime_type.as_str())
            .body(blob.bytes.clone());
        let response = self.send(request, "blob upload").await?;
        let uploaded: UploadBlobResponse = response
            .json()
            .await
            .map_err(PlatformError::from)?;
        Ok(uploaded.blob)
    }

    async fn build_embed(&self, post: &Outgoing) -> Result<Option<Value>> {
        if !post.images.is_empty() {
            let mut images = Vec::new();
            for blob in post.images.iter().take(BLUESKY_MAX_IMAGES) {
                let uploaded = self.upload_blob(blob).await?;
                images.push(json!({ "alt": "", "image": uploaded }));
            }
            return Ok(Some(json!({
                "$type": "app.bsky.embed.images",
                "images": images,
            })));
        }

        let Some(ExternalEmbed { uri, title, description, thumb }) = &post.embed else {
            return Ok(None);
        };

        let mut external = json!({
            "uri": uri,
            "title": title,
            "description": description,
        });
        if let Some(thumb) = thumb {
            external["thumb"] = self.upload_blob(thumb).await?;
        }

        Ok(Some(json!({
            "$type": "app.bsky.embed.external",
            "external": external,
        })))
    }
}

#[async_trait]
impl Destination for BlueskyClient {
    async fn authenticate(&mut self) -> Result<()> {
        self.create_session().await
    }

    async fn post(&self, post: &Outgoing) -> Result<String> {
        let session = self.session()?;

        let (text, facets) = render_rich_text(post);
        tracing::debug!("Posting to Bluesky: {} characters", text.chars().count());

        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        if !facets.is_empty() {
            record["facets"] = json!(facets);
        }
        if let Some(embed) = self.build_embed(post).await? {
            record["embed"] = embed;
        }

        let request = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }));
        let response = self.send(request, "posting").await?;
        let created: CreateRecordResponse = response
            .json()
            .await
            .map_err(PlatformError::from)?;

        tracing::debug!("Posted to Bluesky: {}", created.uri);
        Ok(created.uri)
    }

    fn name(&self) -> &str {
        "bluesky"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(BLUESKY_CHARACTER_LIMIT)
    }

    fn max_attachments(&self) -> usize {
        BLUESKY_MAX_IMAGES
    }

    fn max_attachment_size(&self) -> usize {
        BLUESKY_MAX_IMAGE_BYTES
    }
}
