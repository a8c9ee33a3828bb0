//! Core types for Mirrorcast

use serde::{Deserialize, Serialize};

/// A Reddit submission as seen by the mirror bots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    /// Base-36 id without the `t3_` prefix.
    pub id: String,
    pub title: String,
    pub score: i64,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub media: Option<SubmissionMedia>,
}

impl Submission {
    /// Short `redd.it` link, as used in mirrored posts.
    pub fn shortlink(&self) -> String {
        format!("https://redd.it/{}", self.id)
    }

    pub fn oembed(&self) -> Option<&Oembed> {
        self.media.as_ref().and_then(|m| m.oembed.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SubmissionMedia {
    #[serde(default)]
    pub oembed: Option<Oembed>,
}

/// oEmbed metadata Reddit attaches to video links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Oembed {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a Content-Type value (e.g., "image/jpeg; charset=binary")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Downloaded image bytes ready to be uploaded to a destination.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBlob {
    pub source_url: String,
    pub mime_type: ImageMimeType,
    pub bytes: Vec<u8>,
}

impl MediaBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name derived from the last path segment of the source URL.
    pub fn file_name(&self) -> String {
        let path = self.source_url.split(['?', '#']).next().unwrap_or_default();
        match path.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("media.{}", self.mime_type.extension()),
        }
    }
}

/// Link card shown under a post (Bluesky `app.bsky.embed.external`).
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEmbed {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: Option<MediaBlob>,
}

/// A post ready to be sent to a destination.
///
/// `text` is the body. Destinations with rich text render `link` and `tag`
/// as facets appended after it; plain-text destinations get them inlined by the
/// composer instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outgoing {
    pub text: String,
    pub link: Option<(String, String)>,
    pub tag: Option<String>,
    pub images: Vec<MediaBlob>,
    pub embed: Option<ExternalEmbed>,
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Character count of everything that will be rendered.
    pub fn rendered_len(&self) -> usize {
        let mut len = self.text.chars().count();
        if let Some((label, _)) = &self.link {
            len += label.chars().count();
        }
        if let Some(tag) = &self.tag {
            if self.link.is_some() {
                len += " • ".chars().count();
            }
            len += tag.chars().count() + 1;
        }
        len
    }
}
