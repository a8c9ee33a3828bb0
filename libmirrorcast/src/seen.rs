//! "Already posted" tracking
//!
//! Every bot records the source ids it has mirrored so a later run never posts
//! the same item twice. Three backends share one trait:
//!
//! - [`FlatFileStore`]: whitespace-separated ids in a text file, never pruned
//! - [`BoundedFifoStore`]: the newest `capacity` ids, persisted as a JSON array
//! - [`DatabaseStore`]: rows in the SQLite `seen_items` table, never pruned
//!
//! After `add(id)`, `seen(id)` is true until eviction (FIFO) or forever (others).

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{expand_path, StoreConfig, StoreKind};
use crate::db::Database;
use crate::error::{ConfigError, MirrorError, Result, StoreError};

#[async_trait]
pub trait SeenStore: Send + Sync {
    /// Whether `id` has already been processed
    async fn seen(&self, id: &str) -> Result<bool>;

    /// Record `id` as processed. Adding a known id is a no-op.
    async fn add(&mut self, id: &str) -> Result<()>;

    /// Backend name for log lines
    fn kind(&self) -> &str;
}

fn io_error(path: &Path, source: std::io::Error) -> MirrorError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
    .into()
}

/// Line-delimited id file, appended to on every add
pub struct FlatFileStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl FlatFileStore {
    /// Open the store, treating a missing file as empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let ids = match std::fs::read_to_string(&path) {
            Ok(content) => content.split_whitespace().map(str::to_string).collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        tracing::debug!("Loaded {} seen ids from {}", ids.len(), path.display());
        Ok(Self { path, ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[async_trait]
impl SeenStore for FlatFileStore {
    async fn seen(&self, id: &str) -> Result<bool> {
        Ok(self.ids.contains(id))
    }

    async fn add(&mut self, id: &str) -> Result<()> {
        if self.ids.contains(id) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        writeln!(file, "{}", id).map_err(|e| io_error(&self.path, e))?;

        self.ids.insert(id.to_string());
        Ok(())
    }

    fn kind(&self) -> &str {
        "flat"
    }
}

/// Fixed-capacity queue of the most recently added ids
///
/// The whole queue is rewritten (temp file + rename) on every add, so a crash
/// mid-write leaves the previous state intact.
pub struct BoundedFifoStore {
    path: PathBuf,
    capacity: usize,
    queue: VecDeque<String>,
}

impl BoundedFifoStore {
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MirrorError::InvalidInput(
                "FIFO store capacity must be at least 1".to_string(),
            ));
        }

        let path = path.as_ref().to_path_buf();
        let mut queue: VecDeque<String> = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => VecDeque::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        // Capacity may have shrunk since the file was written
        while queue.len() > capacity {
            queue.pop_front();
        }

        Ok(Self {
            path,
            capacity,
            queue,
        })
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids from oldest to newest
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let json = serde_json::to_string(&self.queue).map_err(|e| StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl SeenStore for BoundedFifoStore {
    async fn seen(&self, id: &str) -> Result<bool> {
        Ok(self.queue.iter().any(|known| known == id))
    }

    async fn add(&mut self, id: &str) -> Result<()> {
        if self.queue.iter().any(|known| known == id) {
            return Ok(());
        }

        self.queue.push_back(id.to_string());
        while self.queue.len() > self.capacity {
            if let Some(evicted) = self.queue.pop_front() {
                tracing::debug!("Evicted {} from seen queue", evicted);
            }
        }

        self.persist()
    }

    fn kind(&self) -> &str {
        "fifo"
    }
}

/// Seen ids stored in SQLite, namespaced per bot
pub struct DatabaseStore {
    db: Database,
    namespace: String,
}

impl DatabaseStore {
    pub fn new(db: Database, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl SeenStore for DatabaseStore {
    async fn seen(&self, id: &str) -> Result<bool> {
        self.db.is_seen(&self.namespace, id).await
    }

    async fn add(&mut self, id: &str) -> Result<()> {
        self.db.mark_seen(&self.namespace, id).await
    }

    fn kind(&self) -> &str {
        "database"
    }
}

/// Path of a flat or FIFO store, which must be set
fn store_path(config: &StoreConfig, namespace: &str) -> Result<PathBuf> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::MissingField(format!("{}.store.path", namespace)).into());
    }
    Ok(expand_path(&config.path))
}

/// Open the store described by `config`
///
/// `db` is only consulted for [`StoreKind::Database`].
pub fn open_store(
    config: &StoreConfig,
    namespace: &str,
    db: Option<&Database>,
) -> Result<Box<dyn SeenStore>> {
    let store: Box<dyn SeenStore> = match config.kind {
        StoreKind::Flat => Box::new(FlatFileStore::open(store_path(config, namespace)?)?),
        StoreKind::Fifo => Box::new(BoundedFifoStore::open(
            store_path(config, namespace)?,
            config.capacity,
        )?),
        StoreKind::Database => {
            let db = db.ok_or_else(|| {
                MirrorError::InvalidInput(format!(
                    "{} store for '{}' needs an open database",
                    config.kind, namespace
                ))
            })?;
            Box::new(DatabaseStore::new(db.clone(), namespace))
        }
    };

    tracing::debug!("Opened {} seen store for {}", store.kind(), namespace);
    Ok(store)
}
