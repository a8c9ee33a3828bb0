//! Destination abstraction and implementations
//!
//! A destination is somewhere a composed [`Outgoing`] post is published.
//! Each implementation handles its own authentication, media upload and
//! content limits.

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::Outgoing;

pub mod bluesky;
pub mod twitter;

// Not test-gated: integration tests use it too
pub mod mock;

/// Unified interface for publishing a post
#[async_trait]
pub trait Destination: Send + Sync {
    /// Establish a session. Must be called before [`Destination::post`].
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the credentials are rejected.
    async fn authenticate(&mut self) -> Result<()>;

    /// Publish `post` and return the destination's id for it
    ///
    /// # Errors
    ///
    /// - `PlatformError::Authentication` when not authenticated
    /// - `PlatformError::Posting` when the destination rejects the post
    /// - `PlatformError::Unreachable` when the request never reached the destination
    /// - `PlatformError::Network` / `RateLimit` for other transient failures
    async fn post(&self, post: &Outgoing) -> Result<String>;

    /// Check limits before posting
    fn validate_content(&self, post: &Outgoing) -> Result<()> {
        validate_outgoing(
            self.name(),
            post,
            self.character_limit(),
            self.max_attachments(),
            self.max_attachment_size(),
        )
    }

    /// Lowercase identifier, e.g. "twitter"
    fn name(&self) -> &str;

    /// Maximum rendered characters, or `None` for no hard limit
    fn character_limit(&self) -> Option<usize>;

    fn max_attachments(&self) -> usize {
        4
    }

    /// Largest single attachment in bytes
    fn max_attachment_size(&self) -> usize;
}

/// Shared limit checks used by every destination
pub fn validate_outgoing(
    name: &str,
    post: &Outgoing,
    character_limit: Option<usize>,
    max_attachments: usize,
    max_attachment_size: usize,
) -> Result<()> {
    if post.text.trim().is_empty() {
        return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
    }

    if let Some(limit) = character_limit {
        let len = post.rendered_len();
        if len > limit {
            return Err(PlatformError::Validation(format!(
                "Content exceeds {}'s {} character limit (current: {} characters)",
                name, limit, len
            ))
            .into());
        }
    }

    if post.images.len() > max_attachments {
        return Err(PlatformError::Validation(format!(
            "Too many images for {}: {} (max {})",
            name,
            post.images.len(),
            max_attachments
        ))
        .into());
    }

    if let Some(blob) = post.images.iter().find(|b| b.len() > max_attachment_size) {
        return Err(PlatformError::Validation(format!(
            "Image {} is {} bytes, over {}'s limit of {}",
            blob.source_url,
            blob.len(),
            name,
            max_attachment_size
        ))
        .into());
    }

    Ok(())
}
