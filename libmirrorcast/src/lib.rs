//! Mirrorcast - polling bots that mirror community content across platforms
//!
//! Each bot fetches recent items from a source (Reddit, a Twitch team roster,
//! YouTube feeds), filters and dedupes them against a persisted "seen" set, and
//! posts or writes the result to a destination (Twitter, Bluesky, a subreddit
//! sidebar). This library holds everything the individual binaries share.

pub mod bots;
pub mod checkpoint;
pub mod config;
pub mod daemon;
pub mod db;
pub mod destinations;
pub mod error;
pub mod logging;
pub mod media;
pub mod oauth1;
pub mod relay;
pub mod seen;
pub mod sources;
pub mod sprite;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{MirrorError, Result};
pub use relay::{Relay, RelayOutcome};
pub use seen::SeenStore;
pub use types::{Outgoing, Submission};
