//! mirror-auth - Obtain Twitter access tokens through the OAuth PIN flow

use clap::Parser;
use libmirrorcast::config::require;
use libmirrorcast::logging::{LogFormat, LoggingConfig};
use libmirrorcast::oauth1::{access_token, authorize_url, request_token, OAuth1Credentials};
use libmirrorcast::sources::http_client;
use libmirrorcast::{Config, MirrorError, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mirror-auth")]
#[command(version)]
#[command(about = "Obtain Twitter access tokens through the OAuth PIN flow")]
#[command(long_about = "\
mirror-auth - Obtain Twitter access tokens through the OAuth PIN flow

DESCRIPTION:
    Asks Twitter for a request token, prints the URL where the bot account
    approves the app, reads the PIN shown there from stdin and exchanges it
    for an access token pair. The pair is printed as a [twitter] snippet to
    paste into the config file.

    The consumer key and secret come from [twitter] in the config file
    unless given on the command line.

USAGE:
    mirror-auth
    mirror-auth --consumer-key KEY --consumer-secret SECRET

EXIT CODES:
    0 - Success
    1 - Network or configuration error
    2 - Twitter rejected the credentials or the PIN
    3 - Invalid input (e.g. an empty PIN)
")]
struct Cli {
    /// Config file (default: ~/.config/mirrorcast/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Consumer (API) key, overrides twitter.consumer_key
    #[arg(long, value_name = "KEY")]
    consumer_key: Option<String>,

    /// Consumer (API) secret, overrides twitter.consumer_secret
    #[arg(long, value_name = "SECRET")]
    consumer_secret: Option<String>,

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

fn read_pin() -> Result<String> {
    eprint!("PIN: ");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| MirrorError::InvalidInput(format!("Could not read PIN: {}", e)))?;

    let pin = line.trim().to_string();
    if pin.is_empty() {
        return Err(MirrorError::InvalidInput("No PIN entered".to_string()));
    }
    Ok(pin)
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_with(cli.config.as_deref())?;
    let twitter = &config.twitter;

    let consumer_key = cli.consumer_key.unwrap_or_else(|| twitter.consumer_key.clone());
    let consumer_secret = cli
        .consumer_secret
        .unwrap_or_else(|| twitter.consumer_secret.clone());
    let consumer = OAuth1Credentials::new(
        require(&consumer_key, "twitter.consumer_key")?,
        require(&consumer_secret, "twitter.consumer_secret")?,
    );

    let client = http_client("mirrorcast-auth")?;

    let request = request_token(&client, &twitter.api_base, &consumer).await?;
    tracing::debug!("Got request token");

    eprintln!("Authorize the app while logged in as the bot account:");
    eprintln!();
    eprintln!("    {}", authorize_url(&twitter.api_base, &request.token));
    eprintln!();

    let pin = read_pin()?;
    let access = access_token(&client, &twitter.api_base, &consumer, &request, &pin).await?;

    println!("[twitter]");
    println!("access_token = \"{}\"", access.token);
    println!("access_token_secret = \"{}\"", access.secret);
    Ok(())
}
