//! Mirror popular subreddit posts to Twitter or Bluesky
//!
//! Reads the subreddit's hot listing, keeps submissions that are popular
//! enough (or carry an always-mirrored flair), and relays the first unseen
//! one to the destination.

use async_trait::async_trait;
use std::sync::Arc;

use crate::bots::{open_database, reddit_session, RunOptions};
use crate::config::{Config, MirrorConfig};
use crate::destinations::bluesky::{BlueskyClient, BLUESKY_CHARACTER_LIMIT, BLUESKY_MAX_IMAGES, BLUESKY_MAX_IMAGE_BYTES};
use crate::destinations::twitter::{TwitterClient, TWITTER_MAX_IMAGES, TWITTER_MAX_IMAGE_BYTES};
use crate::destinations::Destination;
use crate::error::Result;
use crate::media::{filter_by_size, HttpImageLoader, ImageLoader, ImgurClient, MediaFetcher, SubmissionKind};
use crate::relay::{Composer, Relay, RelayOutcome};
use crate::seen::open_store;
use crate::sources::reddit::SubmissionSource;
use crate::text::truncate_title;
use crate::types::{ExternalEmbed, MediaBlob, Outgoing, Submission};

pub const LINK_LABEL: &str = "view on reddit";

/// Separator the Bluesky destination puts between link and tag
const LINK_TAG_SEPARATOR: &str = " • ";

/// Passes submissions with an always-mirrored flair or a high enough score
pub fn default_filter(config: &MirrorConfig) -> impl Fn(&Submission) -> bool + Send + Sync + 'static {
    let always_flairs = config.always_flairs.clone();
    let min_score = config.min_score;

    move |submission| {
        submission
            .link_flair_text
            .as_deref()
            .is_some_and(|flair| always_flairs.iter().any(|f| f == flair))
            || submission.score >= min_score
    }
}

/// Load, size-filter and cap the images behind an image submission
async fn attach_images(
    submission: &Submission,
    loader: &dyn ImageLoader,
    max_bytes: usize,
    max_count: usize,
) -> Vec<MediaBlob> {
    match loader.images_for(&submission.url).await {
        Ok(images) => {
            let mut images = filter_by_size(images, max_bytes);
            images.truncate(max_count);
            images
        }
        Err(e) => {
            tracing::warn!("Could not load media for {}: {}", submission.shortlink(), e);
            Vec::new()
        }
    }
}

/// `{title} {shortlink} #{hashtag}` cut to `limit`, with video links and images
pub async fn compose_tweet(
    submission: &Submission,
    hashtag: &str,
    limit: usize,
    loader: &dyn ImageLoader,
) -> Result<Outgoing> {
    let mut meta = format!(" {} #{}", submission.shortlink(), hashtag);
    let mut images = Vec::new();

    match SubmissionKind::of(submission) {
        SubmissionKind::Image => {
            images = attach_images(submission, loader, TWITTER_MAX_IMAGE_BYTES, TWITTER_MAX_IMAGES).await;
        }
        SubmissionKind::VideoLink => {
            meta = format!("{}\n{}", meta, submission.url);
        }
        SubmissionKind::SelfPost | SubmissionKind::Link => {}
    }

    Ok(Outgoing {
        text: truncate_title(&submission.title, &meta, limit),
        images,
        ..Default::default()
    })
}

/// `{title}\n` followed by a "view on reddit" link and the hashtag as facets
pub async fn compose_skeet(
    submission: &Submission,
    hashtag: &str,
    loader: &dyn ImageLoader,
) -> Result<Outgoing> {
    let facet_len = LINK_LABEL.chars().count()
        + LINK_TAG_SEPARATOR.chars().count()
        + hashtag.chars().count()
        + 1;
    let text = truncate_title(
        &submission.title,
        "\n",
        BLUESKY_CHARACTER_LIMIT.saturating_sub(facet_len),
    );

    let mut outgoing = Outgoing {
        text,
        link: Some((LINK_LABEL.to_string(), submission.shortlink())),
        tag: Some(hashtag.to_string()),
        ..Default::default()
    };

    if SubmissionKind::of(submission) == SubmissionKind::Image {
        outgoing.images =
            attach_images(submission, loader, BLUESKY_MAX_IMAGE_BYTES, BLUESKY_MAX_IMAGES).await;
    } else if let Some(oembed) = submission.oembed() {
        let thumb = match &oembed.thumbnail_url {
            Some(url) => loader.fetch(url).await.unwrap_or_else(|e| {
                tracing::warn!("Could not fetch thumbnail {}: {}", url, e);
                None
            }),
            None => None,
        };

        outgoing.embed = Some(ExternalEmbed {
            uri: submission.url.clone(),
            title: oembed.title.clone(),
            description: format!(
                "{} {} by {}",
                oembed.provider_name, oembed.kind, oembed.author_name
            ),
            thumb,
        });
    }

    Ok(outgoing)
}

pub struct TweetComposer {
    pub hashtag: String,
    pub limit: usize,
    pub loader: Arc<dyn ImageLoader>,
}

#[async_trait]
impl Composer for TweetComposer {
    async fn compose(&self, submission: &Submission) -> Result<Outgoing> {
        compose_tweet(submission, &self.hashtag, self.limit, self.loader.as_ref()).await
    }
}

pub struct SkeetComposer {
    pub hashtag: String,
    pub loader: Arc<dyn ImageLoader>,
}

#[async_trait]
impl Composer for SkeetComposer {
    async fn compose(&self, submission: &Submission) -> Result<Outgoing> {
        compose_skeet(submission, &self.hashtag, self.loader.as_ref()).await
    }
}

/// Which destination the mirror posts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorTarget {
    Twitter,
    Bluesky,
}

impl MirrorTarget {
    pub fn name(&self) -> &'static str {
        match self {
            MirrorTarget::Twitter => "twitter",
            MirrorTarget::Bluesky => "bluesky",
        }
    }
}

/// Fetch the hot listing and hand it to the relay
pub async fn run_once(
    source: &dyn SubmissionSource,
    relay: &mut Relay,
    mirror: &MirrorConfig,
) -> Result<RelayOutcome> {
    let candidates = source.hot(&mirror.subreddit, mirror.hot_limit).await?;
    tracing::debug!("Considering {} submissions from r/{}", candidates.len(), mirror.subreddit);
    relay.run(candidates).await
}

/// Build the relay for `target` from configuration
///
/// The destination is authenticated unless this is a dry run.
pub async fn build_relay(
    config: &Config,
    target: MirrorTarget,
    client: reqwest::Client,
    options: RunOptions,
) -> Result<Relay> {
    let db = open_database(config).await?;

    let imgur = ImgurClient::new(client.clone(), &config.imgur.api_base, &config.imgur.client_id);
    let loader: Arc<dyn ImageLoader> =
        Arc::new(HttpImageLoader::new(imgur, MediaFetcher::new(client.clone())));

    let (store_config, oldest_first) = match target {
        MirrorTarget::Twitter => (&config.twitter.store, config.twitter.oldest_first),
        MirrorTarget::Bluesky => (&config.bluesky.store, config.bluesky.oldest_first),
    };
    let store = open_store(store_config, target.name(), Some(&db))?;

    let (mut destination, composer): (Box<dyn Destination>, Box<dyn Composer>) = match target {
        MirrorTarget::Twitter => (
            Box::new(TwitterClient::new(&config.twitter, client)?),
            Box::new(TweetComposer {
                hashtag: config.mirror.hashtag.clone(),
                limit: config.twitter.max_length,
                loader,
            }),
        ),
        MirrorTarget::Bluesky => (
            Box::new(BlueskyClient::new(&config.bluesky, client)?),
            Box::new(SkeetComposer {
                hashtag: config.mirror.hashtag.clone(),
                loader,
            }),
        ),
    };

    if !options.dry_run {
        destination.authenticate().await?;
    }

    Ok(Relay::new(store, destination, composer)
        .filter(default_filter(&config.mirror))
        .oldest_first(oldest_first)
        .dry_run(options.dry_run)
        .database(db))
}

/// One complete mirror pass: log in everywhere, read hot, relay
pub async fn run(config: &Config, target: MirrorTarget, options: RunOptions) -> Result<RelayOutcome> {
    let (client, reddit) = reddit_session(config).await?;
    let mut relay = build_relay(config, target, client, options).await?;
    let mut outcome = run_once(&reddit, &mut relay, &config.mirror).await?;

    tracing::info!("{} mirror finished ({})", target.name(), outcome.summary());
    if let Some(e) = outcome.mark_error.take() {
        return Err(e);
    }
    Ok(outcome)
}
