//! The bots: each one wires a source to a destination for a single run

pub mod reddit_mirror;
pub mod twitch_status;
pub mod youtube_alerts;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::sources::http_client;
use crate::sources::reddit::RedditClient;

/// Flags shared by every bot binary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compose and log without posting or marking anything seen
    pub dry_run: bool,
}

/// Open the configured database
pub async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database.path).await
}

/// HTTP client plus an authenticated Reddit client
pub async fn reddit_session(config: &Config) -> Result<(reqwest::Client, RedditClient)> {
    let client = http_client(&config.reddit.user_agent)?;
    let mut reddit = RedditClient::from_config(&config.reddit, client.clone())?;
    reddit.authenticate().await?;
    Ok((client, reddit))
}
