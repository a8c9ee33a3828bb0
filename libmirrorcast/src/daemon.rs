//! Run-once or `--watch` loop shared by the bot binaries
//!
//! Without an interval a bot makes a single pass and its error becomes the
//! exit status, which suits cron. With one, passes repeat until SIGINT or
//! SIGTERM; a failing pass is logged and the loop carries on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::{MirrorError, Result};

const SHUTDOWN_POLL: Duration = Duration::from_secs(1);

/// Parse a `--watch` value such as `5m` or `1h 30m`
pub fn parse_interval(value: &str) -> Result<Duration> {
    let interval = humantime::parse_duration(value)
        .map_err(|e| MirrorError::InvalidInput(format!("Invalid interval '{}': {}", value, e)))?;
    if interval.is_zero() {
        return Err(MirrorError::InvalidInput("Interval must be greater than zero".to_string()));
    }
    Ok(interval)
}

/// Shared stop flag, set by the signal handler
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Set the flag on SIGINT or SIGTERM
    #[cfg(unix)]
    pub fn install_signal_handlers(&self) -> Result<()> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])
            .map_err(|e| MirrorError::InvalidInput(format!("Signal setup failed: {}", e)))?;

        let shutdown = self.clone();
        std::thread::spawn(move || {
            if signals.forever().next().is_some() {
                info!("Received shutdown signal, stopping after the current pass...");
                shutdown.request();
            }
        });

        Ok(())
    }

    #[cfg(not(unix))]
    pub fn install_signal_handlers(&self) -> Result<()> {
        tracing::debug!("Signal handling is only available on Unix");
        Ok(())
    }

    /// Sleep for `duration`, waking early once shutdown is requested
    async fn wait(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.is_requested() {
            let step = remaining.min(SHUTDOWN_POLL);
            sleep(step).await;
            remaining -= step;
        }
    }
}

/// Run `pass` once, or every `interval` until shutdown
///
/// Returns the number of passes made.
pub async fn run_passes<T, F, Fut>(
    interval: Option<Duration>,
    shutdown: &Shutdown,
    mut pass: F,
) -> Result<u64>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(interval) = interval else {
        pass().await?;
        return Ok(1);
    };

    info!("Watching every {}", humantime::format_duration(interval));
    let mut passes = 0;

    while !shutdown.is_requested() {
        if let Err(e) = pass().await {
            error!("Pass failed: {}", e);
        }
        passes += 1;
        shutdown.wait(interval).await;
    }

    info!("Shutdown requested, stopping after {} passes", passes);
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("1h 30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_interval("soon").is_err());
        assert!(matches!(parse_interval("0s"), Err(MirrorError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_single_pass_propagates_error() {
        let shutdown = Shutdown::new();
        let result = run_passes(None, &shutdown, || async {
            Err::<(), MirrorError>(PlatformError::Authentication("bad".to_string()).into())
        })
        .await;

        assert_eq!(result.unwrap_err().exit_code(), 2);
    }

    #[tokio::test]
    async fn test_watch_continues_after_errors_until_shutdown() {
        let shutdown = Shutdown::new();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let stopper = shutdown.clone();

        let passes = run_passes(Some(Duration::from_millis(5)), &shutdown, move || {
            let stopper = stopper.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 3 {
                    stopper.request();
                }
                if n == 1 {
                    return Err(MirrorError::from(PlatformError::Network("flaky".to_string())));
                }
                Ok::<(), MirrorError>(())
            }
        })
        .await
        .unwrap();

        assert_eq!(passes, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_returns_early_on_shutdown() {
        let shutdown = Shutdown::new();
        shutdown.request();

        let started = std::time::Instant::now();
        shutdown.wait(Duration::from_secs(60)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
