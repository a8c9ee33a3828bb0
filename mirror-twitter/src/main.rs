//! mirror-twitter - Mirror popular subreddit posts to Twitter

use clap::Parser;
use libmirrorcast::bots::reddit_mirror::{self, MirrorTarget};
use libmirrorcast::bots::RunOptions;
use libmirrorcast::daemon::{parse_interval, run_passes, Shutdown};
use libmirrorcast::logging::{LogFormat, LoggingConfig};
use libmirrorcast::{Config, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mirror-twitter")]
#[command(version)]
#[command(about = "Mirror popular subreddit posts to Twitter")]
#[command(long_about = "\
mirror-twitter - Mirror popular subreddit posts to Twitter

DESCRIPTION:
    Reads the configured subreddit's hot listing and tweets the first
    submission that is popular enough (or carries an always-mirrored flair)
    and has not been tweeted before. At most one tweet is sent per pass.

    Image posts get their images attached; clip and video links are
    appended to the tweet text.

USAGE:
    # One pass, for cron
    mirror-twitter

    # Preview the next tweet without sending it
    mirror-twitter --dry-run

    # Keep running, one pass every ten minutes
    mirror-twitter --watch 10m

CONFIGURATION:
    Configuration file: ~/.config/mirrorcast/config.toml

    [reddit]   client_id, client_secret, refresh_token
    [mirror]   subreddit, min_score, always_flairs, hashtag
    [twitter]  consumer_key, consumer_secret, access_token, access_token_secret

    Run mirror-auth to obtain the access token pair.

EXIT CODES:
    0 - Success
    1 - Platform, configuration or storage error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    /// Config file (default: ~/.config/mirrorcast/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Compose the next tweet and log it without posting
    #[arg(long)]
    dry_run: bool,

    /// Run repeatedly, waiting this long between passes (e.g. 10m)
    #[arg(long, value_name = "DURATION", value_parser = parse_interval)]
    watch: Option<Duration>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_with(cli.config.as_deref())?;
    let options = RunOptions {
        dry_run: cli.dry_run,
    };

    let shutdown = Shutdown::new();
    if cli.watch.is_some() {
        shutdown.install_signal_handlers()?;
    }

    let config = &config;
    let passes = run_passes(cli.watch, &shutdown, move || {
        reddit_mirror::run(config, MirrorTarget::Twitter, options)
    })
    .await?;
    tracing::info!("Finished after {} pass(es)", passes);

    Ok(())
}
