//! Mock destination for testing
//!
//! Records every post it receives and can be told to fail a number of times
//! before succeeding, which is enough to drive the relay's retry and
//! failure-continue paths without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::destinations::Destination;
use crate::error::{PlatformError, Result};
use crate::types::Outgoing;

/// Configuration for mock destination behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    pub auth_succeeds: bool,

    /// Number of upcoming `post` calls that fail with `failure`
    pub fail_times: Arc<Mutex<usize>>,

    /// Error returned while `fail_times` is non-zero
    pub failure: PlatformError,

    pub character_limit: Option<usize>,

    pub max_attachment_size: usize,

    pub auth_call_count: Arc<Mutex<usize>>,

    pub post_call_count: Arc<Mutex<usize>>,

    /// Posts that went through
    pub posted: Arc<Mutex<Vec<Outgoing>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_succeeds: true,
            fail_times: Arc::new(Mutex::new(0)),
            failure: PlatformError::Posting("Mock posting failed".to_string()),
            character_limit: None,
            max_attachment_size: usize::MAX,
            auth_call_count: Arc::new(Mutex::new(0)),
            post_call_count: Arc::new(Mutex::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockDestination {
    config: MockConfig,
    authenticated: bool,
}

impl MockDestination {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// Authenticated mock that always succeeds
    pub fn success(name: &str) -> Self {
        let mut destination = Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        });
        destination.authenticated = true;
        destination
    }

    /// Authenticated mock whose next `times` posts fail with `error`
    pub fn failing(name: &str, times: usize, error: PlatformError) -> Self {
        let mut destination = Self::new(MockConfig {
            name: name.to_string(),
            fail_times: Arc::new(Mutex::new(times)),
            failure: error,
            ..Default::default()
        });
        destination.authenticated = true;
        destination
    }

    pub fn auth_failure(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_succeeds: false,
            ..Default::default()
        })
    }

    pub fn with_limit(name: &str, limit: usize) -> Self {
        let mut destination = Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        });
        destination.authenticated = true;
        destination
    }

    /// Shared handle to the recorded posts, usable after the mock is boxed
    pub fn posted_handle(&self) -> Arc<Mutex<Vec<Outgoing>>> {
        Arc::clone(&self.config.posted)
    }

    pub fn auth_call_count(&self) -> usize {
        *self.config.auth_call_count.lock().unwrap()
    }

    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    pub fn posted(&self) -> Vec<Outgoing> {
        self.config.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn authenticate(&mut self) -> Result<()> {
        *self.config.auth_call_count.lock().unwrap() += 1;

        if self.config.auth_succeeds {
            self.authenticated = true;
            Ok(())
        } else {
            Err(PlatformError::Authentication("Mock authentication failed".to_string()).into())
        }
    }

    async fn post(&self, post: &Outgoing) -> Result<String> {
        *self.config.post_call_count.lock().unwrap() += 1;

        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        {
            let mut remaining = self.config.fail_times.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(self.config.failure.clone().into());
            }
        }

        let mut posted = self.config.posted.lock().unwrap();
        posted.push(post.clone());
        Ok(format!("{}:mock-{}", self.config.name, posted.len()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    fn max_attachment_size(&self) -> usize {
        self.config.max_attachment_size
    }
}
