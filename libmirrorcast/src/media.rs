//! Media discovery and download for image submissions
//!
//! A Reddit link is classified into an image source (Imgur album, Imgur image,
//! Reddit-hosted image), resolved to direct image URLs, then downloaded.
//! Oversized images are dropped rather than resized.

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{PlatformError, Result};
use crate::sources::check_status;
use crate::types::{ImageMimeType, MediaBlob, Submission};

const IMAGE_HOSTS: [&str; 3] = ["imgur.com", "i.redd.it", "i.reddituploads.com"];
const VIDEO_HOSTS: [&str; 2] = ["clips.twitch.tv", "youtube.com"];
const REDDIT_IMAGE_HOSTS: [&str; 2] = ["i.redd.it", "i.reddituploads.com"];

/// Some image hosts refuse requests without a browser-like agent
const FETCH_USER_AGENT: &str = "Mozilla/5.0";

/// How a submission should be rendered when mirrored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    SelfPost,
    Image,
    VideoLink,
    Link,
}

impl SubmissionKind {
    pub fn of(submission: &Submission) -> Self {
        if submission.is_self {
            SubmissionKind::SelfPost
        } else if IMAGE_HOSTS.iter().any(|h| submission.url.contains(h)) {
            SubmissionKind::Image
        } else if VIDEO_HOSTS.iter().any(|h| submission.url.contains(h)) {
            SubmissionKind::VideoLink
        } else {
            SubmissionKind::Link
        }
    }
}

/// Where the images behind a link live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    ImgurAlbum(String),
    ImgurImage(String),
    /// Direct URL, already carrying an image extension
    RedditHosted(String),
    Unsupported,
}

fn album_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(https?)://(www\.)?(?:m\.)?imgur\.com/a/([a-zA-Z0-9]+)(#[0-9]+)?")
            .expect("valid album regex")
    })
}

fn image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://)?(?:www\.)?(?:m\.)?(?:i\.)?imgur\.com/([a-zA-Z0-9]+)")
            .expect("valid image regex")
    })
}

fn extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/([^/]+\.(?:jpg|jpeg|gif|png))").expect("valid extension regex")
    })
}

/// Force https and map Imgur gallery links onto album links
pub fn normalize_media_url(url: &str) -> String {
    url.replace("http:", "https:").replace("gallery", "a")
}

pub fn classify_media_url(url: &str) -> MediaSource {
    let url = normalize_media_url(url);

    if let Some(caps) = album_regex().captures(&url) {
        return MediaSource::ImgurAlbum(caps[3].to_string());
    }

    if let Some(caps) = image_regex().captures(&url) {
        return MediaSource::ImgurImage(caps[1].to_string());
    }

    if REDDIT_IMAGE_HOSTS.iter().any(|h| url.contains(h)) {
        if extension_regex().is_match(&url) {
            return MediaSource::RedditHosted(url);
        }
        return MediaSource::RedditHosted(format!("{}.jpg", url));
    }

    MediaSource::Unsupported
}

#[derive(Deserialize)]
struct ImgurEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ImgurAlbum {
    #[serde(default)]
    images: Vec<ImgurImage>,
}

#[derive(Deserialize)]
struct ImgurImage {
    link: String,
}

/// Resolves Imgur ids to direct image links
pub struct ImgurClient {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
}

impl ImgurClient {
    pub fn new(client: reqwest::Client, api_base: &str, client_id: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, path))
            .header("Authorization", format!("Client-ID {}", self.client_id))
            .send()
            .await
            .map_err(PlatformError::from)?;

        let response = check_status("Imgur", path, response).await?;
        let envelope: ImgurEnvelope<T> = response.json().await.map_err(PlatformError::from)?;
        Ok(envelope.data)
    }

    pub async fn resolve(&self, source: &MediaSource) -> Result<Vec<String>> {
        match source {
            MediaSource::ImgurAlbum(id) => {
                let album: ImgurAlbum = self.get(&format!("album/{}", id)).await?;
                Ok(album.images.into_iter().map(|i| i.link).collect())
            }
            MediaSource::ImgurImage(id) => {
                let image: ImgurImage = self.get(&format!("image/{}", id)).await?;
                Ok(vec![image.link])
            }
            MediaSource::RedditHosted(url) => Ok(vec![url.clone()]),
            MediaSource::Unsupported => Ok(Vec::new()),
        }
    }

    /// Direct image URLs behind a submission link
    pub async fn media_urls(&self, url: &str) -> Result<Vec<String>> {
        let source = classify_media_url(url);
        tracing::debug!("Classified {} as {:?}", url, source);
        self.resolve(&source).await
    }
}

/// Downloads images
pub struct MediaFetcher {
    client: reqwest::Client,
}

impl MediaFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url`, returning `None` when it is not a supported image
    pub async fn fetch(&self, url: &str) -> Result<Option<MediaBlob>> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, FETCH_USER_AGENT)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Media host", url, response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.starts_with("image") {
            tracing::debug!("Skipping {}: content type {:?}", url, content_type);
            return Ok(None);
        }

        let Some(mime_type) = ImageMimeType::from_mime_str(&content_type) else {
            tracing::debug!("Skipping {}: unsupported image type {}", url, content_type);
            return Ok(None);
        };

        let bytes = response.bytes().await.map_err(PlatformError::from)?;
        Ok(Some(MediaBlob {
            source_url: url.to_string(),
            mime_type,
            bytes: bytes.to_vec(),
        }))
    }

    /// Download several images concurrently, keeping input order and
    /// dropping anything that failed or was not an image
    pub async fn fetch_all(&self, urls: &[String]) -> Vec<MediaBlob> {
        let results = join_all(urls.iter().map(|url| self.fetch(url))).await;

        results
            .into_iter()
            .zip(urls)
            .filter_map(|(result, url)| match result {
                Ok(blob) => blob,
                Err(e) => {
                    tracing::warn!("Failed to download {}: {}", url, e);
                    None
                }
            })
            .collect()
    }
}

/// Loads the images a composer attaches to a post
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Every image behind a submission link, in album order
    async fn images_for(&self, url: &str) -> Result<Vec<MediaBlob>>;

    /// A single image, or `None` when the URL is not an image
    async fn fetch(&self, url: &str) -> Result<Option<MediaBlob>>;
}

/// Imgur resolution plus plain HTTP download
pub struct HttpImageLoader {
    imgur: ImgurClient,
    fetcher: MediaFetcher,
}

impl HttpImageLoader {
    pub fn new(imgur: ImgurClient, fetcher: MediaFetcher) -> Self {
        Self { imgur, fetcher }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn images_for(&self, url: &str) -> Result<Vec<MediaBlob>> {
        let urls = self.imgur.media_urls(url).await?;
        Ok(self.fetcher.fetch_all(&urls).await)
    }

    async fn fetch(&self, url: &str) -> Result<Option<MediaBlob>> {
        self.fetcher.fetch(url).await
    }
}

/// Drop blobs larger than `max_bytes`
pub fn filter_by_size(blobs: Vec<MediaBlob>, max_bytes: usize) -> Vec<MediaBlob> {
    blobs
        .into_iter()
        .filter(|blob| {
            let fits = blob.len() <= max_bytes;
            if !fits {
                tracing::warn!(
                    "Dropping {} ({} bytes, limit {})",
                    blob.source_url,
                    blob.len(),
                    max_bytes
                );
            }
            fits
        })
        .collect()
}
