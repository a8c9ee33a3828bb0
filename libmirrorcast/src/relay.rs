//! Idempotent relay of source submissions to a destination
//!
//! The relay walks candidates in order, skips anything filtered out or
//! already seen, and posts the first remaining one. A failed post is logged
//! and recorded, and the relay moves on to the next candidate. At most one
//! post goes out per run.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::db::{Database, PostRecord};
use crate::destinations::Destination;
use crate::error::{MirrorError, Result};
use crate::seen::SeenStore;
use crate::types::{Outgoing, Submission};

/// Turns a submission into a post for one destination
#[async_trait]
pub trait Composer: Send + Sync {
    async fn compose(&self, submission: &Submission) -> Result<Outgoing>;
}

pub type Filter = Box<dyn Fn(&Submission) -> bool + Send + Sync>;

/// Attempts and backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Same attempts, no waiting
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// Only errors for which [`crate::MirrorError::is_transient`] holds are retried.
/// Use this for reads and for writes that are safe to repeat.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_while(policy, label, MirrorError::is_transient, op).await
}

/// Like [`with_retry`], for requests that create something
///
/// Only failures where the server never acted on the request are retried
/// ([`crate::MirrorError::is_unsent`]). A 5xx or a lost response is final, so
/// a post is never sent twice.
pub async fn with_send_retry<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_while(policy, label, MirrorError::is_unsent, op).await
}

async fn retry_while<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    retryable: fn(&MirrorError) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if retryable(&e) && attempt < max_attempts => {
                let delay = policy.base_delay * 2_u32.pow(attempt - 1);
                warn!(
                    "Transient error during {} (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt == max_attempts && retryable(&e) {
                    warn!("{} failed after {} attempts: {}", label, max_attempts, e);
                }
                return Err(e);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub source_id: String,
    pub post_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failed {
    pub source_id: String,
    pub error: String,
}

/// What happened to each candidate of a run
#[derive(Debug, Default)]
pub struct RelayOutcome {
    pub posted: Option<Posted>,
    pub skipped_seen: Vec<String>,
    pub skipped_filtered: Vec<String>,
    pub failed: Vec<Failed>,
    /// Composed post that a dry run would have sent
    pub preview: Option<Outgoing>,
    /// Set when `posted` went out but could not be marked seen
    pub mark_error: Option<MirrorError>,
}

impl RelayOutcome {
    pub fn summary(&self) -> String {
        format!(
            "posted: {}, seen: {}, filtered: {}, failed: {}",
            self.posted.as_ref().map(|p| p.source_id.as_str()).unwrap_or("none"),
            self.skipped_seen.len(),
            self.skipped_filtered.len(),
            self.failed.len()
        )
    }
}

pub struct Relay {
    store: Box<dyn SeenStore>,
    destination: Box<dyn Destination>,
    composer: Box<dyn Composer>,
    filter: Filter,
    db: Option<Database>,
    retry: RetryPolicy,
    oldest_first: bool,
    dry_run: bool,
}

impl Relay {
    pub fn new(
        store: Box<dyn SeenStore>,
        destination: Box<dyn Destination>,
        composer: Box<dyn Composer>,
    ) -> Self {
        Self {
            store,
            destination,
            composer,
            filter: Box::new(|_| true),
            db: None,
            retry: RetryPolicy::default(),
            oldest_first: false,
            dry_run: false,
        }
    }

    pub fn filter(mut self, filter: impl Fn(&Submission) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Record every attempt in `post_records`
    pub fn database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn oldest_first(mut self, oldest_first: bool) -> Self {
        self.oldest_first = oldest_first;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &dyn SeenStore {
        self.store.as_ref()
    }

    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    async fn record(&self, record: PostRecord) {
        if let Some(db) = &self.db {
            if let Err(e) = db.record_attempt(&record).await {
                warn!("Could not record attempt for {}: {}", record.source_id, e);
            }
        }
    }

    /// Compose, validate and send one submission
    async fn send(&self, submission: &Submission) -> Result<String> {
        let outgoing = self.composer.compose(submission).await?;
        self.destination.validate_content(&outgoing)?;

        let label = format!("posting {} to {}", submission.id, self.destination.name());
        with_send_retry(self.retry, &label, || self.destination.post(&outgoing)).await
    }

    pub async fn run(&mut self, mut candidates: Vec<Submission>) -> Result<RelayOutcome> {
        if self.oldest_first {
            candidates.reverse();
        }

        let destination = self.destination.name().to_string();
        let mut outcome = RelayOutcome::default();

        for submission in &candidates {
            if !(self.filter)(submission) {
                outcome.skipped_filtered.push(submission.id.clone());
                continue;
            }

            if self.store.seen(&submission.id).await? {
                debug!("Skipping {}", submission.id);
                outcome.skipped_seen.push(submission.id.clone());
                continue;
            }

            if self.dry_run {
                match self.composer.compose(submission).await {
                    Ok(outgoing) => {
                        info!(
                            "[dry run] Would post {} to {}: {}",
                            submission.shortlink(),
                            destination,
                            outgoing.text
                        );
                        outcome.preview = Some(outgoing);
                        break;
                    }
                    Err(e) => {
                        error!("[dry run] Could not compose {}: {}", submission.shortlink(), e);
                        outcome.failed.push(Failed {
                            source_id: submission.id.clone(),
                            error: e.to_string(),
                        });
                        continue;
                    }
                }
            }

            info!("Posting: {}", submission.shortlink());

            match self.send(submission).await {
                Ok(post_id) => {
                    self.record(PostRecord::success(&submission.id, &destination, post_id.clone()))
                        .await;
                    info!("Posted {} to {} as {}", submission.id, destination, post_id);
                    outcome.posted = Some(Posted {
                        source_id: submission.id.clone(),
                        post_id,
                    });
                    if let Err(e) = self.store.add(&submission.id).await {
                        error!(
                            "Posted {} but could not mark it in the {} store: {}",
                            submission.id,
                            self.store.kind(),
                            e
                        );
                        outcome.mark_error = Some(e);
                    }
                    break;
                }
                Err(e) => {
                    error!("Error posting {}: {}", submission.shortlink(), e);
                    self.record(PostRecord::failure(&submission.id, &destination, e.to_string()))
                        .await;
                    outcome.failed.push(Failed {
                        source_id: submission.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::mock::MockDestination;
    use crate::error::PlatformError;
    use crate::seen::BoundedFifoStore;
    use crate::MirrorError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct TitleComposer;

    #[async_trait]
    impl Composer for TitleComposer {
        async fn compose(&self, submission: &Submission) -> Result<Outgoing> {
            Ok(Outgoing::text(submission.title.clone()))
        }
    }

    fn submission(id: &str, score: i64) -> Submission {
        Submission {
            id: id.to_string(),
            title: format!("title {}", id),
            score,
            link_flair_text: None,
            is_self: true,
            url: String::new(),
            permalink: String::new(),
            media: None,
        }
    }

    fn store(dir: &TempDir) -> Box<dyn SeenStore> {
        Box::new(BoundedFifoStore::open(dir.path().join("seen.json"), 10).unwrap())
    }

    #[tokio::test]
    async fn test_with_retry_transient_then_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(RetryPolicy::immediate(), "op", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(MirrorError::Platform(PlatformError::Network("reset".to_string())))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(RetryPolicy::immediate(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MirrorError::Platform(PlatformError::Authentication("no".to_string())))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(RetryPolicy::immediate(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MirrorError::Platform(PlatformError::RateLimit("slow".to_string())))
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_posts_first_unseen_and_stops() {
        let dir = TempDir::new().unwrap();
        let destination = MockDestination::success("mock");
        let posted = destination.posted_handle();

        let mut relay = Relay::new(store(&dir), Box::new(destination), Box::new(TitleComposer))
            .retry(RetryPolicy::immediate());

        let outcome = relay
            .run(vec![submission("a", 100), submission("b", 100)])
            .await
            .unwrap();

        assert_eq!(outcome.posted.unwrap().source_id, "a");
        assert_eq!(posted.lock().unwrap().len(), 1);
        assert!(relay.store().seen("a").await.unwrap());
        assert!(!relay.store().seen("b").await.unwrap());

        // second run skips the seen id and posts the next one
        let outcome = relay
            .run(vec![submission("a", 100), submission("b", 100)])
            .await
            .unwrap();
        assert_eq!(outcome.skipped_seen, vec!["a".to_string()]);
        assert_eq!(outcome.posted.unwrap().source_id, "b");
    }

    #[tokio::test]
    async fn test_filter_and_oldest_first() {
        let dir = TempDir::new().unwrap();
        let mut relay = Relay::new(
            store(&dir),
            Box::new(MockDestination::success("mock")),
            Box::new(TitleComposer),
        )
        .filter(|s| s.score >= 80)
        .oldest_first(true);

        let outcome = relay
            .run(vec![
                submission("new", 100),
                submission("mid", 100),
                submission("old", 5),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.skipped_filtered, vec!["old".to_string()]);
        assert_eq!(outcome.posted.unwrap().source_id, "mid");
    }

    #[tokio::test]
    async fn test_failure_continues_to_next_candidate() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(":memory:").await.unwrap();
        let destination =
            MockDestination::failing("mock", 1, PlatformError::Posting("rejected".to_string()));

        let mut relay = Relay::new(store(&dir), Box::new(destination), Box::new(TitleComposer))
            .database(db.clone())
            .retry(RetryPolicy::immediate());

        let outcome = relay
            .run(vec![submission("a", 100), submission("b", 100)])
            .await
            .unwrap();

        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].source_id, "a");
        assert_eq!(outcome.posted.unwrap().source_id, "b");
        assert!(!relay.store().seen("a").await.unwrap());

        let records = db.records_for("a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        let records = db.records_for("b").await.unwrap();
        assert!(records[0].success);
    }

    #[tokio::test]
    async fn test_unsent_post_is_retried() {
        let dir = TempDir::new().unwrap();
        let destination =
            MockDestination::failing("mock", 2, PlatformError::Unreachable("refused".to_string()));
        let posted = destination.posted_handle();

        let mut relay = Relay::new(store(&dir), Box::new(destination), Box::new(TitleComposer))
            .retry(RetryPolicy::immediate());

        let outcome = relay.run(vec![submission("a", 100)]).await.unwrap();
        assert_eq!(outcome.posted.unwrap().source_id, "a");
        assert!(outcome.failed.is_empty());
        assert_eq!(posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_post_failure_is_not_resent() {
        let dir = TempDir::new().unwrap();
        // One failure only: a retry would succeed and post
        let destination =
            MockDestination::failing("mock", 1, PlatformError::Network("HTTP 503".to_string()));
        let posted = destination.posted_handle();

        let mut relay = Relay::new(store(&dir), Box::new(destination), Box::new(TitleComposer))
            .retry(RetryPolicy::immediate());

        let outcome = relay.run(vec![submission("a", 100)]).await.unwrap();
        assert!(outcome.posted.is_none());
        assert_eq!(outcome.failed[0].source_id, "a");
        assert!(posted.lock().unwrap().is_empty());
        assert!(!relay.store().seen("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_with_send_retry_stops_on_server_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_send_retry(RetryPolicy::immediate(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MirrorError::Platform(PlatformError::from_status("Twitter", "tweet", 502, "")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Reports nothing as seen and refuses every add
    struct UnwritableStore;

    #[async_trait]
    impl SeenStore for UnwritableStore {
        async fn seen(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn add(&mut self, id: &str) -> Result<()> {
            Err(crate::error::StoreError::Io {
                path: format!("posted ({})", id),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            }
            .into())
        }

        fn kind(&self) -> &str {
            "unwritable"
        }
    }

    #[tokio::test]
    async fn test_post_is_recorded_even_when_marking_fails() {
        let db = Database::new(":memory:").await.unwrap();
        let destination = MockDestination::success("mock");
        let posted = destination.posted_handle();

        let mut relay = Relay::new(Box::new(UnwritableStore), Box::new(destination), Box::new(TitleComposer))
            .database(db.clone())
            .retry(RetryPolicy::immediate());

        let outcome = relay
            .run(vec![submission("a", 100), submission("b", 100)])
            .await
            .unwrap();

        assert_eq!(outcome.posted.as_ref().unwrap().source_id, "a");
        assert!(matches!(outcome.mark_error, Some(MirrorError::Store(_))));
        assert_eq!(posted.lock().unwrap().len(), 1);

        let records = db.records_for("a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
    }

    /// Fails to compose the submission with id "a"
    struct PickyComposer;

    #[async_trait]
    impl Composer for PickyComposer {
        async fn compose(&self, submission: &Submission) -> Result<Outgoing> {
            if submission.id == "a" {
                return Err(MirrorError::InvalidInput("no media".to_string()));
            }
            Ok(Outgoing::text(submission.title.clone()))
        }
    }

    #[tokio::test]
    async fn test_dry_run_compose_failure_moves_on() {
        let dir = TempDir::new().unwrap();
        let mut relay = Relay::new(
            store(&dir),
            Box::new(MockDestination::success("mock")),
            Box::new(PickyComposer),
        )
        .dry_run(true);

        let outcome = relay
            .run(vec![submission("a", 100), submission("b", 100)])
            .await
            .unwrap();

        assert_eq!(outcome.failed[0].source_id, "a");
        assert_eq!(outcome.preview.unwrap().text, "title b");
    }

    #[tokio::test]
    async fn test_dry_run_does_not_post_or_mark() {
        let dir = TempDir::new().unwrap();
        let destination = MockDestination::success("mock");
        let posted = destination.posted_handle();

        let mut relay = Relay::new(store(&dir), Box::new(destination), Box::new(TitleComposer))
            .dry_run(true);

        let outcome = relay.run(vec![submission("a", 100)]).await.unwrap();
        assert!(outcome.posted.is_none());
        assert_eq!(outcome.preview.unwrap().text, "title a");
        assert!(posted.lock().unwrap().is_empty());
        assert!(!relay.store().seen("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_validation_failure_counts_as_failed() {
        let dir = TempDir::new().unwrap();
        let mut relay = Relay::new(
            store(&dir),
            Box::new(MockDestination::with_limit("mock", 3)),
            Box::new(TitleComposer),
        );

        let outcome = relay.run(vec![submission("a", 100)]).await.unwrap();
        assert!(outcome.posted.is_none());
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].error.contains("character limit"));
    }
}
