//! mirror-twitch - Keep a subreddit sidebar in sync with a Twitch team's streams

use clap::Parser;
use libmirrorcast::bots::{twitch_status, RunOptions};
use libmirrorcast::daemon::{parse_interval, run_passes, Shutdown};
use libmirrorcast::logging::{LogFormat, LoggingConfig};
use libmirrorcast::{Config, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mirror-twitch")]
#[command(version)]
#[command(about = "Keep a subreddit sidebar in sync with a Twitch team's streams")]
#[command(long_about = "\
mirror-twitch - Keep a subreddit sidebar in sync with a Twitch team's streams

DESCRIPTION:
    Looks up every member of the Twitch team on Helix and writes who is
    live (most viewers first), who is hosting and who is offline into the
    subreddit twice: as a text widget on the new Reddit sidebar and as a
    marked block in the old Reddit sidebar wiki page.

    The old sidebar block replaces everything between the
    [](#BOT_STREAMS) and [](/BOT_STREAMS) markers, which must already
    exist in the page. The wiki is only edited when the block changed.

USAGE:
    # One refresh, for cron
    mirror-twitch

    # Print the widget and sidebar text without editing anything
    mirror-twitch --dry-run

    # Refresh every two minutes
    mirror-twitch --watch 2m

CONFIGURATION:
    Configuration file: ~/.config/mirrorcast/config.toml

    [reddit]  client_id, client_secret, refresh_token
    [twitch]  client_id, client_secret, subreddit, widget_id, team_url

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

    /// Log the widget and sidebar text without editing the subreddit
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
    let passes = run_passes(cli.watch, &shutdown, move || twitch_status::run(config, options)).await?;
    tracing::info!("Finished after {} pass(es)", passes);

    Ok(())
}
