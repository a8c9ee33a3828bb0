//! Twitch adapters: app token, Helix lookups, the team roster and the
//! legacy hosts endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{MirrorError, PlatformError, Result, StoreError};
use crate::sources::check_status;

/// Helix accepts at most this many ids per query
pub const HELIX_BATCH: usize = 100;

/// App access token for the Helix API
#[derive(Debug, Clone)]
pub struct TwitchAuth {
    pub client_id: String,
    pub access_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TwitchAuth {
    /// Client-credentials grant against the Twitch id service
    pub async fn client_credentials(
        client: &reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self> {
        tracing::debug!("Requesting Twitch app token");

        let response = client
            .post(token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Twitch", "token exchange", response).await?;
        let token: TokenResponse = response.json().await.map_err(|e| {
            PlatformError::Authentication(format!("Twitch token response unreadable: {}", e))
        })?;

        Ok(Self {
            client_id: client_id.to_string(),
            access_token: token.access_token,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixStream {
    pub user_id: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub viewer_count: u64,
}

impl HelixStream {
    /// Helix reports `live`, or an empty type when the stream is in an error state
    pub fn is_live(&self) -> bool {
        self.kind.is_empty() || self.kind == "live"
    }
}

#[derive(Deserialize)]
struct HelixGame {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct HelixPage<T> {
    data: Vec<T>,
}

pub struct HelixClient {
    client: reqwest::Client,
    base: String,
    auth: TwitchAuth,
    game_names: HashMap<String, String>,
}

impl HelixClient {
    pub fn new(client: reqwest::Client, base: &str, auth: TwitchAuth) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            auth,
            game_names: HashMap::new(),
        }
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        key: &str,
        values: &[String],
    ) -> Result<Vec<T>> {
        let mut query: Vec<(&str, &str)> = values.iter().map(|v| (key, v.as_str())).collect();
        if endpoint == "streams" {
            query.push(("first", "100"));
        }

        let response = self
            .client
            .get(format!("{}/{}", self.base, endpoint))
            .header("Client-Id", &self.auth.client_id)
            .bearer_auth(&self.auth.access_token)
            .query(&query)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = check_status("Twitch", endpoint, response).await?;
        let page: HelixPage<T> = response.json().await.map_err(PlatformError::from)?;
        Ok(page.data)
    }

    async fn batched<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        key: &str,
        ids: &[String],
    ) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(HELIX_BATCH) {
            out.extend(self.get_page(endpoint, key, chunk).await?);
        }
        Ok(out)
    }

    pub async fn users(&self, ids: &[String]) -> Result<Vec<HelixUser>> {
        self.batched("users", "id", ids).await
    }

    /// Live streams for the given users; offline users are simply absent
    pub async fn streams(&self, user_ids: &[String]) -> Result<Vec<HelixStream>> {
        self.batched("streams", "user_id", user_ids).await
    }

    /// Game names by id, cached for the lifetime of the client
    pub async fn games(&mut self, ids: &[String]) -> Result<HashMap<String, String>> {
        let mut missing: Vec<String> = ids
            .iter()
            .filter(|id| !id.is_empty() && !self.game_names.contains_key(*id))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        if !missing.is_empty() {
            let games: Vec<HelixGame> = self.batched("games", "id", &missing).await?;
            for game in games {
                self.game_names.insert(game.id, game.name);
            }
        }

        Ok(ids
            .iter()
            .filter_map(|id| self.game_names.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}

/// Channel details published for each team member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamChannel {
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(default)]
    pub channel: TeamChannel,
}

/// Team members keyed by Twitch user id, in key order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamRoster {
    pub members: BTreeMap<String, TeamMember>,
}

impl TeamRoster {
    pub fn ids(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn last_game(&self, id: &str) -> Option<&str> {
        self.members
            .get(id)
            .and_then(|m| m.channel.game.as_deref())
            .filter(|g| !g.is_empty())
    }

    pub fn load_cache(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| {
            StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn save_cache(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self).map_err(|e| MirrorError::InvalidInput(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| {
            StoreError::Io {
                path: path.display().to_string(),
                source: e,
            }
            .into()
        })
    }

    async fn download(client: &reqwest::Client, url: &str) -> Result<Self> {
        let response = client.get(url).send().await.map_err(PlatformError::from)?;
        let response = check_status("Team roster", url, response).await?;
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    /// Download the roster, refreshing the cache, or fall back to the cache
    pub async fn fetch(client: &reqwest::Client, url: &str, cache: Option<&Path>) -> Result<Self> {
        tracing::debug!("Checking for team updates");

        match Self::download(client, url).await {
            Ok(roster) => {
                if let Some(cache) = cache {
                    if let Err(e) = roster.save_cache(cache) {
                        tracing::warn!("Could not write team cache: {}", e);
                    }
                }
                Ok(roster)
            }
            Err(e) => {
                tracing::error!("Error updating team: {}", e);
                match cache {
                    Some(cache) if cache.exists() => {
                        tracing::info!("Using cached team from {}", cache.display());
                        Self::load_cache(cache)
                    }
                    _ => Err(e),
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct HostsResponse {
    #[serde(default)]
    hosts: Vec<HostEntry>,
}

#[derive(Deserialize)]
struct HostEntry {
    #[serde(default)]
    target_id: Option<Value>,
    #[serde(default)]
    target_display_name: Option<String>,
}

/// Who an offline channel is hosting, via the legacy tmi endpoint
pub struct HostLookup {
    client: reqwest::Client,
    url: String,
    client_id: String,
}

impl HostLookup {
    pub fn new(client: reqwest::Client, url: &str, client_id: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// Display name of the hosted channel; every failure reads as not hosting
    pub async fn target(&self, user_id: &str) -> Option<String> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("include_logins", "1"),
                ("host", user_id),
            ])
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::debug!("Host lookup for {} returned {}", user_id, response.status());
            return None;
        }

        let hosts: HostsResponse = response.json().await.ok()?;
        let entry = hosts.hosts.into_iter().next()?;
        match entry.target_id {
            Some(Value::Null) | None => None,
            Some(_) => entry.target_display_name,
        }
    }
}
