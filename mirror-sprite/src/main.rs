//! mirror-sprite - Build the Twitch team logo sprite sheet and its CSS

use clap::Parser;
use libmirrorcast::bots::RunOptions;
use libmirrorcast::daemon::{parse_interval, run_passes, Shutdown};
use libmirrorcast::logging::{LogFormat, LoggingConfig};
use libmirrorcast::{sprite, Config, MirrorError, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mirror-sprite")]
#[command(version)]
#[command(about = "Build the Twitch team logo sprite sheet and its CSS")]
#[command(long_about = "\
mirror-sprite - Build the Twitch team logo sprite sheet and its CSS

DESCRIPTION:
    Downloads the logo of every team member, scales each to a square
    thumbnail and stacks them top to bottom into one PNG. The matching
    stylesheet rules are printed to stdout, one per member:

        a[href*=\"<id>\"]:before { background-position: 0 -<offset>px }

    Upload the PNG and paste the rules into the subreddit stylesheet.
    Logos that cannot be downloaded or decoded are left out.

USAGE:
    mirror-sprite
    mirror-sprite --output ~/sidebar/sprite.png > sprite.css

CONFIGURATION:
    Configuration file: ~/.config/mirrorcast/config.toml

    [sprite]  team_url, thumb_size, output

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

    /// Build the sheet and print the CSS without writing the PNG
    #[arg(long)]
    dry_run: bool,

    /// Run repeatedly, waiting this long between passes (e.g. 10m)
    #[arg(long, value_name = "DURATION", value_parser = parse_interval)]
    watch: Option<Duration>,

    /// Where to write the PNG (overrides sprite.output)
    #[arg(short, long, value_name = "PATH")]
    output: Option<String>,

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
    let mut config = Config::load_with(cli.config.as_deref())?;
    if let Some(output) = cli.output {
        config.sprite.output = output;
    }
    let options = RunOptions {
        dry_run: cli.dry_run,
    };

    let shutdown = Shutdown::new();
    if cli.watch.is_some() {
        shutdown.install_signal_handlers()?;
    }

    let config = &config;
    let passes = run_passes(cli.watch, &shutdown, move || async move {
        let sheet = sprite::run(config, options).await?;
        print!("{}", sheet.css);
        Ok::<(), MirrorError>(())
    })
    .await?;
    tracing::info!("Finished after {} pass(es)", passes);

    Ok(())
}
