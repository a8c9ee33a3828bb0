//! YouTube channel uploads, read from the public Atom feed

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{MirrorError, PlatformError, Result};
use crate::sources::check_status;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const YT_NS: &str = "http://www.youtube.com/xml/schemas/2015";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub title: String,
    pub video_id: String,
    pub channel_id: String,
    pub published: DateTime<Utc>,
}

impl VideoEntry {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

fn child_text(node: roxmltree::Node<'_, '_>, ns: &str, name: &str) -> Option<String> {
    node.children()
        .find(|c| c.has_tag_name((ns, name)))
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
}

/// Parse an uploads feed; entries missing an id or a timestamp are skipped
pub fn parse_feed(xml: &str) -> Result<Vec<VideoEntry>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| MirrorError::InvalidInput(format!("Malformed YouTube feed: {}", e)))?;

    let mut entries = Vec::new();
    for entry in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
    {
        let Some(video_id) = child_text(entry, YT_NS, "videoId") else {
            tracing::debug!("Skipping feed entry without a video id");
            continue;
        };

        let published = child_text(entry, ATOM_NS, "published")
            .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
            .map(|p| p.with_timezone(&Utc));
        let Some(published) = published else {
            tracing::debug!("Skipping {}: unreadable publish time", video_id);
            continue;
        };

        entries.push(VideoEntry {
            title: child_text(entry, ATOM_NS, "title").unwrap_or_default(),
            channel_id: child_text(entry, YT_NS, "channelId").unwrap_or_default(),
            video_id,
            published,
        });
    }

    Ok(entries)
}

/// Entries published after `checkpoint`, oldest first
pub fn new_since(mut entries: Vec<VideoEntry>, checkpoint: Option<DateTime<Utc>>) -> Vec<VideoEntry> {
    if let Some(checkpoint) = checkpoint {
        entries.retain(|e| e.published > checkpoint);
    }
    entries.sort_by_key(|e| e.published);
    entries
}

/// Recent uploads of a channel
#[async_trait]
pub trait VideoFeed: Send + Sync {
    async fn fetch(&self, channel_id: &str) -> Result<Vec<VideoEntry>>;
}

pub struct YoutubeFeed {
    client: reqwest::Client,
    feed_base: String,
}

impl YoutubeFeed {
    pub fn new(client: reqwest::Client, feed_base: &str) -> Self {
        Self {
            client,
            feed_base: feed_base.to_string(),
        }
    }
}

#[async_trait]
impl VideoFeed for YoutubeFeed {
    async fn fetch(&self, channel_id: &str) -> Result<Vec<VideoEntry>> {
        let response = self
            .client
            .get(&self.feed_base)
            .query(&[("channel_id", channel_id)])
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("YouTube", "feed", response).await?;
        let body = response.text().await.map_err(PlatformError::from)?;
        parse_feed(&body)
    }
}
