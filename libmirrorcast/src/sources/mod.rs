//! Source platform adapters and shared HTTP plumbing

use std::time::Duration;

use crate::error::{PlatformError, Result};

pub mod reddit;
pub mod twitch;
pub mod youtube;

/// Build the HTTP client every adapter uses
pub fn http_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Turn a non-2xx response into a classified `PlatformError`
pub async fn check_status(
    platform: &str,
    context: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::from_status(platform, context, status.as_u16(), &body).into())
}
