//! Configuration management for Mirrorcast
//!
//! Every bot reads the same TOML file. Secrets may also come from the
//! environment (or a `.env` file), which takes precedence over the file so the
//! bots can run from cron with nothing but environment variables set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reddit: RedditConfig,
    #[serde(default)]
    pub imgur: ImgurConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub bluesky: BlueskyConfig,
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
    #[serde(default)]
    pub sprite: SpriteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/mirrorcast/mirrorcast.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Used for installed/web apps authorised once by a moderator.
    pub refresh_token: Option<String>,
    /// Used for script apps (password grant).
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
    pub api_base: String,
    pub token_url: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: None,
            username: None,
            password: None,
            user_agent: format!("mirrorcast/{}", env!("CARGO_PKG_VERSION")),
            api_base: "https://oauth.reddit.com".to_string(),
            token_url: "https://www.reddit.com/api/v1/access_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImgurConfig {
    pub client_id: String,
    pub api_base: String,
}

impl Default for ImgurConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            api_base: "https://api.imgur.com/3".to_string(),
        }
    }
}

/// Which Reddit submissions get mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub subreddit: String,
    pub hot_limit: usize,
    pub min_score: i64,
    /// Flairs that are always mirrored regardless of score.
    pub always_flairs: Vec<String>,
    pub hashtag: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            subreddit: String::new(),
            hot_limit: 7,
            min_score: 80,
            always_flairs: vec!["Weekly Post".to_string()],
            hashtag: "vinesauce".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Line-delimited ids, unbounded
    Flat,
    /// Bounded queue persisted as JSON, oldest evicted first
    Fifo,
    /// `seen_items` table in the SQLite database
    Database,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Flat => write!(f, "flat"),
            StoreKind::Fifo => write!(f, "fifo"),
            StoreKind::Database => write!(f, "database"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub kind: StoreKind,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    200
}

impl StoreConfig {
    pub fn flat(path: &str) -> Self {
        Self {
            kind: StoreKind::Flat,
            path: path.to_string(),
            capacity: default_capacity(),
        }
    }

    pub fn fifo(path: &str, capacity: usize) -> Self {
        Self {
            kind: StoreKind::Fifo,
            path: path.to_string(),
            capacity,
        }
    }

    pub fn database() -> Self {
        Self {
            kind: StoreKind::Database,
            path: String::new(),
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    pub api_base: String,
    pub upload_base: String,
    /// Length budget used when truncating titles.
    pub max_length: usize,
    pub oldest_first: bool,
    pub store: StoreConfig,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            api_base: "https://api.twitter.com".to_string(),
            upload_base: "https://upload.twitter.com".to_string(),
            max_length: 180,
            oldest_first: false,
            store: StoreConfig::flat("posted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    pub username: String,
    pub password: String,
    pub pds: String,
    pub oldest_first: bool,
    pub store: StoreConfig,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            pds: "https://bsky.social".to_string(),
            oldest_first: true,
            store: StoreConfig::database(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    pub subreddit: String,
    pub widget_id: String,
    pub team_url: String,
    pub team_cache: String,
    /// Legacy tmi hosts endpoint. Hosting detection is skipped when unset.
    pub hosts_url: Option<String>,
    pub helix_base: String,
    pub token_url: String,
    pub sidebar_page: String,
    pub open_marker: String,
    pub close_marker: String,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            subreddit: String::new(),
            widget_id: String::new(),
            team_url: "http://vinesauce.com/twitch/team-data-helix.json".to_string(),
            team_cache: "team.json".to_string(),
            hosts_url: None,
            helix_base: "https://api.twitch.tv/helix".to_string(),
            token_url: "https://id.twitch.tv/oauth2/token".to_string(),
            sidebar_page: "config/sidebar".to_string(),
            open_marker: "[](#BOT_STREAMS)".to_string(),
            close_marker: "[](/BOT_STREAMS)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    /// Strings stripped from video titles before posting.
    #[serde(default)]
    pub title_sub: Vec<String>,
    /// Videos whose title contains any of these are never posted.
    #[serde(default)]
    pub title_reject: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub subreddit: String,
    pub feed_base: String,
    pub checkpoint: String,
    pub flair_text: String,
    pub flair_css_class: String,
    /// Stripped from every title, in addition to the channel's `title_sub`.
    pub strip_tags: Vec<String>,
    pub channels: Vec<ChannelConfig>,
    pub store: StoreConfig,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            subreddit: String::new(),
            feed_base: "https://www.youtube.com/feeds/videos.xml".to_string(),
            checkpoint: "last_checked".to_string(),
            flair_text: "Official Video".to_string(),
            flair_css_class: "red".to_string(),
            strip_tags: vec!["[Vinesauce]".to_string(), "[VINESAUCE]".to_string()],
            channels: Vec::new(),
            store: StoreConfig::fifo("seen_videos.json", 200),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteConfig {
    pub team_url: String,
    pub thumb_size: u32,
    pub output: String,
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self {
            team_url: "http://vinesauce.com/twitch/team-data.json".to_string(),
            thumb_size: 38,
            output: "sprite.png".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing config file at the default location is not an error: the
    /// defaults plus environment overrides are used instead.
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, preferring an explicit path when given
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        // A missing .env is the common case
        let _ = dotenvy::dotenv();

        let mut config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let path = resolve_config_path()?;
                if path.exists() {
                    Self::load_from_path(&path)?
                } else {
                    tracing::debug!("No config file at {}, using defaults", path.display());
                    Config::default()
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path without env overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Overlay credentials from the environment onto the file values
    pub fn apply_env_overrides(&mut self) {
        env_string("REDDIT_CLIENT_ID", &mut self.reddit.client_id);
        env_string("REDDIT_CLIENT_SECRET", &mut self.reddit.client_secret);
        env_option("REDDIT_REFRESH_TOKEN", &mut self.reddit.refresh_token);
        env_option("REDDIT_USERNAME", &mut self.reddit.username);
        env_option("REDDIT_PASSWORD", &mut self.reddit.password);

        env_string("IMGUR_CLIENT_ID", &mut self.imgur.client_id);

        env_string("TWITTER_CONSUMER_TOKEN", &mut self.twitter.consumer_key);
        env_string("TWITTER_CONSUMER_SECRET", &mut self.twitter.consumer_secret);
        env_string("TWITTER_ACCESS_TOKEN", &mut self.twitter.access_token);
        env_string("TWITTER_ACCESS_TOKEN_SECRET", &mut self.twitter.access_token_secret);

        env_string("BLUESKY_USERNAME", &mut self.bluesky.username);
        env_string("BLUESKY_PASSWORD", &mut self.bluesky.password);

        env_string("TWITCH_ID", &mut self.twitch.client_id);
        env_string("TWITCH_SECRET", &mut self.twitch.client_secret);
        env_string("WIDGET_ID", &mut self.twitch.widget_id);

        env_string("SUBREDDIT", &mut self.mirror.subreddit);
        env_string("SUBREDDIT", &mut self.twitch.subreddit);
        env_string("SUBREDDIT", &mut self.youtube.subreddit);

        env_string("DATABASE_PATH", &mut self.database.path);
    }
}

fn env_string(var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

fn env_option(var: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = Some(value);
        }
    }
}

/// Return the value, or a `MissingField` error naming it
pub fn require<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field.to_string()).into());
    }
    Ok(value)
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MIRRORCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("mirrorcast").join("config.toml"))
}

/// Expand `~` in a state-file path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
