//! New uploads from configured YouTube channels, submitted as flaired links

use chrono::{DateTime, Utc};

use crate::bots::{open_database, reddit_session, RunOptions};
use crate::checkpoint::Checkpoint;
use crate::config::{expand_path, require, ChannelConfig, Config, StoreKind, YoutubeConfig};
use crate::error::{MirrorError, PlatformError, Result, StoreError};
use crate::relay::{with_retry, with_send_retry, RetryPolicy};
use crate::seen::{open_store, SeenStore};
use crate::sources::reddit::SubredditModerator;
use crate::sources::youtube::{new_since, VideoEntry, VideoFeed, YoutubeFeed};
use crate::text::{channel_title, clean_video_title, rejects};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AlertOutcome {
    /// Titles submitted this run (or that would be, on a dry run)
    pub posted: Vec<String>,
    pub already_submitted: Vec<String>,
    pub rejected: Vec<String>,
    pub skipped_seen: Vec<String>,
    pub failed: Vec<String>,
    /// Submitted video ids the seen store could not record
    pub unmarked: Vec<String>,
    /// Channels whose feed could not be read
    pub feed_errors: usize,
}

impl AlertOutcome {
    pub fn summary(&self) -> String {
        format!(
            "{} posted, {} already submitted, {} rejected, {} seen, {} failed, {} unmarked, {} feed errors",
            self.posted.len(),
            self.already_submitted.len(),
            self.rejected.len(),
            self.skipped_seen.len(),
            self.failed.len(),
            self.unmarked.len(),
            self.feed_errors
        )
    }
}

/// Runs one pass over every channel against a moderator and a seen store
pub struct YoutubeAlerts<'a> {
    feed: &'a dyn VideoFeed,
    moderator: &'a dyn SubredditModerator,
    store: &'a mut dyn SeenStore,
    config: &'a YoutubeConfig,
    retry: RetryPolicy,
    dry_run: bool,
}

impl<'a> YoutubeAlerts<'a> {
    pub fn new(
        feed: &'a dyn VideoFeed,
        moderator: &'a dyn SubredditModerator,
        store: &'a mut dyn SeenStore,
        config: &'a YoutubeConfig,
    ) -> Self {
        Self {
            feed,
            moderator,
            store,
            config,
            retry: RetryPolicy::default(),
            dry_run: false,
        }
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Process every channel, then move the checkpoint to `started`
    ///
    /// With no checkpoint on disk the run only records `started`, so a fresh
    /// install does not flood the subreddit with a channel's back catalogue.
    pub async fn run(&mut self, checkpoint: &Checkpoint, started: DateTime<Utc>) -> Result<AlertOutcome> {
        let mut outcome = AlertOutcome::default();

        let Some(last) = checkpoint.load()? else {
            tracing::info!(
                "No checkpoint at {}; recording {} as the starting point",
                checkpoint.path().display(),
                started
            );
            if !self.dry_run {
                checkpoint.save(started)?;
            }
            return Ok(outcome);
        };

        let config = self.config;
        for channel in &config.channels {
            let entries = match self.feed.fetch(&channel.id).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!("Could not read feed for {} ({}): {}", channel.name, channel.id, e);
                    outcome.feed_errors += 1;
                    continue;
                }
            };

            for video in new_since(entries, Some(last)) {
                self.handle(channel, &video, &mut outcome).await?;
            }
        }

        if !self.dry_run {
            checkpoint.save(started)?;
        }
        Ok(outcome)
    }

    /// Record a submitted video; a store failure is kept for the end of the run
    async fn mark(&mut self, video_id: &str, outcome: &mut AlertOutcome) {
        if let Err(e) = self.store.add(video_id).await {
            tracing::error!("Could not mark {} in the {} store: {}", video_id, self.store.kind(), e);
            outcome.unmarked.push(video_id.to_string());
        }
    }

    async fn handle(&mut self, channel: &ChannelConfig, video: &VideoEntry, outcome: &mut AlertOutcome) -> Result<()> {
        let config = self.config;
        if rejects(&video.title, &channel.title_reject) {
            tracing::debug!("Rejected: {}", video.title);
            outcome.rejected.push(video.title.clone());
            return Ok(());
        }

        let cleaned = clean_video_title(&video.title, &config.strip_tags, &channel.title_sub);
        let title = channel_title(&channel.name, &cleaned);

        if self.store.seen(&video.video_id).await? {
            tracing::debug!("Already seen {}: {}", video.video_id, title);
            outcome.skipped_seen.push(title);
            return Ok(());
        }

        if self.dry_run {
            tracing::info!("[dry run] Would post: {} ({})", title, video.watch_url());
            outcome.posted.push(title);
            return Ok(());
        }

        let subreddit = require(&config.subreddit, "youtube.subreddit")?;
        let url = video.watch_url();
        let moderator = self.moderator;

        let submitted = with_send_retry(self.retry, "submit", || {
            moderator.submit_link(subreddit, &title, &url, true)
        })
        .await;

        match submitted {
            Ok(link) => {
                tracing::info!("Posted: {}", title);
                let fullname = link.fullname();

                let flair = with_retry(self.retry, "flair", || {
                    moderator.set_link_flair(
                        subreddit,
                        &fullname,
                        &config.flair_text,
                        &config.flair_css_class,
                    )
                })
                .await;
                if let Err(e) = flair {
                    tracing::error!("Could not flair {}: {}", fullname, e);
                }

                outcome.posted.push(title);
                self.mark(&video.video_id, outcome).await;
            }
            Err(MirrorError::Platform(PlatformError::AlreadySubmitted(reason))) => {
                tracing::warn!("Already posted: {} ({})", title, reason);
                outcome.already_submitted.push(title);
                self.mark(&video.video_id, outcome).await;
            }
            Err(e) => {
                tracing::error!("Could not submit {}: {}", title, e);
                outcome.failed.push(title);
            }
        }

        Ok(())
    }
}

/// One pass with the configured feed, Reddit account and stores
pub async fn run(config: &Config, options: RunOptions) -> Result<AlertOutcome> {
    let youtube = &config.youtube;
    let started = Utc::now();

    let (client, reddit) = reddit_session(config).await?;
    let db = match youtube.store.kind {
        StoreKind::Database => Some(open_database(config).await?),
        _ => None,
    };
    let mut store = open_store(&youtube.store, "youtube", db.as_ref())?;
    let feed = YoutubeFeed::new(client, &youtube.feed_base);
    let checkpoint = Checkpoint::new(expand_path(&youtube.checkpoint));

    let outcome = YoutubeAlerts::new(&feed, &reddit, store.as_mut(), youtube)
        .dry_run(options.dry_run)
        .run(&checkpoint, started)
        .await?;

    tracing::info!("YouTube alerts finished ({})", outcome.summary());
    if !outcome.unmarked.is_empty() {
        // The checkpoint has moved past these, so they are not submitted again
        return Err(StoreError::Unrecorded(outcome.unmarked.join(", ")).into());
    }
    Ok(outcome)
}
