//! mirror-youtube - Submit new YouTube uploads to a subreddit

use clap::Parser;
use libmirrorcast::bots::{youtube_alerts, RunOptions};
use libmirrorcast::daemon::{parse_interval, run_passes, Shutdown};
use libmirrorcast::logging::{LogFormat, LoggingConfig};
use libmirrorcast::{Config, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mirror-youtube")]
#[command(version)]
#[command(about = "Submit new YouTube uploads to a subreddit")]
#[command(long_about = "\
mirror-youtube - Submit new YouTube uploads to a subreddit

DESCRIPTION:
    Reads the upload feed of every configured channel and submits each
    video published since the last run to the subreddit as a link, then
    flairs it (\"Official Video\" by default).

    Titles containing a channel's title_reject strings are skipped. The
    global strip_tags and the channel's title_sub strings are removed and
    the title is prefixed with the channel name, e.g. [Vinny] Title.

    The time of each run is stored in the checkpoint file. The first run
    only records it. Recently submitted video ids are kept in a bounded
    seen list so a video is never submitted twice.

USAGE:
    # One pass, for cron
    mirror-youtube

    # Show what would be submitted
    mirror-youtube --dry-run

    # Check every five minutes
    mirror-youtube --watch 5m

CONFIGURATION:
    Configuration file: ~/.config/mirrorcast/config.toml

    [reddit]   client_id, client_secret, refresh_token
    [youtube]  subreddit, checkpoint, flair_text, flair_css_class

    [[youtube.channels]]
    id = \"UCxxxxxxxxxxxxxxxxxxxxxx\"
    name = \"Vinny\"
    title_sub = [\"Vinny -\"]
    title_reject = [\"#shorts\"]

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

    /// Log what would be submitted without posting or saving state
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
    let passes = run_passes(cli.watch, &shutdown, move || youtube_alerts::run(config, options)).await?;
    tracing::info!("Finished after {} pass(es)", passes);

    Ok(())
}
