//! Twitch team status in a subreddit's sidebar
//!
//! Looks up every team member on Helix, then writes the same list twice: as
//! a sidebar widget (new Reddit) and as a marked block inside the
//! `config/sidebar` wiki page (old Reddit).

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::bots::{reddit_session, RunOptions};
use crate::config::{expand_path, require, Config, TwitchConfig};
use crate::error::{MirrorError, Result};
use crate::sources::reddit::SubredditModerator;
use crate::sources::twitch::{HelixClient, HelixStream, HelixUser, HostLookup, TeamRoster, TwitchAuth};
use crate::text::splice_between;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Live { viewers: u64, game: String },
    Hosting { target: String },
    Offline { last_game: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub id: String,
    pub login: String,
    pub display_name: String,
    pub state: StreamState,
}

impl ChannelStatus {
    /// CSS anchor used by the subreddit stylesheet
    pub fn kind(&self) -> &'static str {
        match self.state {
            StreamState::Live { .. } => "live",
            StreamState::Hosting { .. } => "hosting",
            StreamState::Offline { .. } => "offline",
        }
    }

    fn rank(&self) -> (u8, Reverse<u64>) {
        match &self.state {
            StreamState::Live { viewers, .. } => (0, Reverse(*viewers)),
            StreamState::Hosting { .. } => (1, Reverse(0)),
            StreamState::Offline { .. } => (2, Reverse(0)),
        }
    }

    fn game_line(&self) -> String {
        match &self.state {
            StreamState::Live { game, .. } => game.trim().to_string(),
            StreamState::Hosting { target } => format!("Hosting {}", target),
            StreamState::Offline { last_game } => last_game.trim().to_string(),
        }
    }

    pub fn render_widget(&self) -> String {
        let status = match &self.state {
            StreamState::Live { viewers, .. } => viewers.to_string(),
            _ => self.kind().to_string(),
        };

        format!(
            "* [](#{})[**~~{}*{}*~~{}**](https://twitch.tv/{})\n",
            self.kind(),
            self.display_name,
            status,
            self.game_line(),
            self.login
        )
    }

    pub fn render_sidebar(&self) -> String {
        let status = match &self.state {
            StreamState::Live { game, .. } => format!("{} playing {}", self.display_name, game),
            StreamState::Hosting { target } => {
                format!("{} is now hosting {}", self.display_name, target)
            }
            StreamState::Offline { last_game } => {
                format!("{} last seen playing {}", self.display_name, last_game)
            }
        };

        format!(
            ">* [{}](#{})[](https://twitch.tv/{})\n",
            status.to_uppercase(),
            self.kind(),
            self.login
        )
    }
}

/// Live channels by viewers (most first), then hosting, then offline
///
/// The sort is stable, so ties keep their roster order.
pub fn sort_statuses(statuses: &mut [ChannelStatus]) {
    statuses.sort_by_key(ChannelStatus::rank);
}

fn timestamp(now: DateTime<Utc>) -> (String, String) {
    (now.format("%X").to_string(), now.format("%x").to_string())
}

pub fn widget_height(count: usize) -> u32 {
    24 + 50 * count as u32
}

pub fn render_widget_text(statuses: &[ChannelStatus], now: DateTime<Utc>) -> String {
    let (time, date) = timestamp(now);
    let mut text: String = statuses.iter().map(ChannelStatus::render_widget).collect();
    text.push_str(&format!("\n\n`LAST UPDATED @ {} {} UTC`", time, date));
    text
}

pub fn render_sidebar_block(statuses: &[ChannelStatus], now: DateTime<Utc>) -> String {
    let any_live = statuses.iter().any(|s| s.kind() == "live");
    let mut block = String::from(if any_live {
        "> ###CLICK A CHANNEL TO START WATCHING!\n"
    } else {
        "> ###TEAM IS OFFLINE\n"
    });

    let mut first_offline = true;
    for status in statuses {
        if first_offline && status.kind() == "offline" {
            block.push_str(">* **[](#separator)**\n");
            first_offline = false;
        }
        block.push_str(&status.render_sidebar());
    }

    let (time, date) = timestamp(now);
    block.push_str(&format!("* `LAST UPDATED\n@ {}\n{} UTC`\n", time, date));
    block
}

fn live_stream<'a>(streams: &'a [HelixStream], user_id: &str) -> Option<&'a HelixStream> {
    streams.iter().find(|s| s.user_id == user_id && s.is_live())
}

/// Users without a live stream, whose host target is worth looking up
pub fn not_live<'a>(users: &'a [HelixUser], streams: &[HelixStream]) -> Vec<&'a HelixUser> {
    users
        .iter()
        .filter(|u| live_stream(streams, &u.id).is_none())
        .collect()
}

/// Combine Helix data, host lookups and the roster into statuses
///
/// `hosting` maps user id to the display name of the hosted channel.
pub fn build_statuses(
    users: &[HelixUser],
    streams: &[HelixStream],
    games: &HashMap<String, String>,
    hosting: &HashMap<String, String>,
    roster: &TeamRoster,
) -> Vec<ChannelStatus> {
    users
        .iter()
        .map(|user| {
            let state = if let Some(stream) = live_stream(streams, &user.id) {
                StreamState::Live {
                    viewers: stream.viewer_count,
                    game: games.get(&stream.game_id).cloned().unwrap_or_default(),
                }
            } else if let Some(target) = hosting.get(&user.id) {
                StreamState::Hosting {
                    target: target.clone(),
                }
            } else {
                StreamState::Offline {
                    last_game: roster.last_game(&user.id).unwrap_or_default().to_string(),
                }
            };

            ChannelStatus {
                id: user.id.clone(),
                login: user.login.clone(),
                display_name: user.display_name.clone(),
                state,
            }
        })
        .collect()
}

/// Query Helix (and optionally the hosts endpoint) for every roster member
pub async fn collect_statuses(
    helix: &mut HelixClient,
    roster: &TeamRoster,
    hosts: Option<&HostLookup>,
) -> Result<Vec<ChannelStatus>> {
    tracing::debug!("Fetching streams");

    let ids = roster.ids();
    let users = helix.users(&ids).await?;
    let streams = helix.streams(&ids).await?;

    let game_ids: Vec<String> = streams.iter().map(|s| s.game_id.clone()).collect();
    let games = helix.games(&game_ids).await?;

    let mut hosting = HashMap::new();
    if let Some(hosts) = hosts {
        let offline = not_live(&users, &streams);
        let targets = join_all(offline.iter().map(|u| hosts.target(&u.id))).await;
        for (user, target) in offline.into_iter().zip(targets) {
            if let Some(target) = target {
                hosting.insert(user.id.clone(), target);
            }
        }
    }

    let mut statuses = build_statuses(&users, &streams, &games, &hosting, roster);
    sort_statuses(&mut statuses);
    Ok(statuses)
}

pub async fn update_widget(
    moderator: &dyn SubredditModerator,
    config: &TwitchConfig,
    statuses: &[ChannelStatus],
    now: DateTime<Utc>,
) -> Result<()> {
    let subreddit = require(&config.subreddit, "twitch.subreddit")?;
    let widget_id = require(&config.widget_id, "twitch.widget_id")?;

    moderator
        .update_text_widget(
            subreddit,
            widget_id,
            &render_widget_text(statuses, now),
            widget_height(statuses.len()),
        )
        .await?;

    tracing::debug!("Updated widget {}", widget_id);
    Ok(())
}

/// Splice the block into the sidebar wiki page; returns whether it was edited
pub async fn update_sidebar(
    moderator: &dyn SubredditModerator,
    config: &TwitchConfig,
    statuses: &[ChannelStatus],
    now: DateTime<Utc>,
) -> Result<bool> {
    let subreddit = require(&config.subreddit, "twitch.subreddit")?;
    let current = moderator.wiki_page(subreddit, &config.sidebar_page).await?;

    let block = render_sidebar_block(statuses, now);
    let updated = splice_between(&current, &config.open_marker, &config.close_marker, &block)
        .map_err(|e| {
            MirrorError::InvalidInput(format!("No streams marker found for /r/{}: {}", subreddit, e))
        })?;

    if updated == current {
        tracing::debug!("Sidebar unchanged");
        return Ok(false);
    }

    moderator
        .edit_wiki_page(subreddit, &config.sidebar_page, &updated, "Update team streams")
        .await?;
    tracing::debug!("Updated sidebar");
    Ok(true)
}

/// Write both outputs; each failure is logged and the first is returned
pub async fn publish(
    moderator: &dyn SubredditModerator,
    config: &TwitchConfig,
    statuses: &[ChannelStatus],
    now: DateTime<Utc>,
    options: RunOptions,
) -> Result<()> {
    if options.dry_run {
        tracing::info!("[dry run] Widget text:\n{}", render_widget_text(statuses, now));
        tracing::info!("[dry run] Sidebar block:\n{}", render_sidebar_block(statuses, now));
        return Ok(());
    }

    let widget = update_widget(moderator, config, statuses, now).await;
    if let Err(e) = &widget {
        tracing::error!("Could not update widget: {}", e);
    }

    let sidebar = update_sidebar(moderator, config, statuses, now).await;
    if let Err(e) = &sidebar {
        tracing::error!("Could not update sidebar: {}", e);
    }

    widget?;
    sidebar?;
    Ok(())
}

/// One full status refresh
pub async fn run(config: &Config, options: RunOptions) -> Result<Vec<ChannelStatus>> {
    let twitch = &config.twitch;
    let client_id = require(&twitch.client_id, "twitch.client_id")?;
    let client_secret = require(&twitch.client_secret, "twitch.client_secret")?;

    let (client, reddit) = reddit_session(config).await?;

    let cache = expand_path(&twitch.team_cache);
    let roster = TeamRoster::fetch(&client, &twitch.team_url, Some(cache.as_path())).await?;

    let auth = TwitchAuth::client_credentials(&client, &twitch.token_url, client_id, client_secret).await?;
    let mut helix = HelixClient::new(client.clone(), &twitch.helix_base, auth);
    let hosts = twitch
        .hosts_url
        .as_deref()
        .map(|url| HostLookup::new(client.clone(), url, client_id));

    let statuses = collect_statuses(&mut helix, &roster, hosts.as_ref()).await?;
    tracing::info!(
        "{} channels, {} live",
        statuses.len(),
        statuses.iter().filter(|s| s.kind() == "live").count()
    );

    publish(&reddit, twitch, &statuses, Utc::now(), options).await?;
    Ok(statuses)
}
