use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::File;
use std::future::Future;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Default refresh interval of hosted registries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// Externally hosted reference data (pool registries, settings datums) held
/// behind a lock and refreshed only once it is older than the TTL.
///
/// Owned by whoever scans; pass it by reference to the code that needs it.
pub struct RegistryCache<T> {
    name: &'static str,
    ttl: Duration,
    entry: RwLock<Option<Entry<T>>>,
}

impl<T: Clone + Send + Sync> RegistryCache<T> {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entry: RwLock::new(None),
        }
    }

    fn fresh(&self, entry: &Option<Entry<T>>) -> Option<T> {
        entry
            .as_ref()
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Cached value, or the loader's result when the cache is empty or stale.
    ///
    /// A failing loader leaves the previous value in place.
    pub async fn get_or_refresh<F, Fut>(&self, loader: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.fresh(&*self.entry.read().await) {
            debug!(registry = self.name, "registry cache hit");
            return Ok(value);
        }
        let mut guard = self.entry.write().await;
        // another task may have refreshed while we waited for the write lock
        if let Some(value) = self.fresh(&guard) {
            return Ok(value);
        }
        let value = loader().await?;
        info!(registry = self.name, ttl_secs = self.ttl.as_secs(), "registry refreshed");
        *guard = Some(Entry {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Last fetched value regardless of age.
    pub async fn peek(&self) -> Option<T> {
        self.entry.read().await.as_ref().map(|e| e.value.clone())
    }

    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

/// Write scanned states as pretty JSON.
pub fn save_snapshot<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| anyhow!("Failed to create snapshot file {}: {}", path.display(), e))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, data)
        .map_err(|e| anyhow!("Failed to write snapshot to {}: {}", path.display(), e))?;
    Ok(())
}

pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| anyhow!("Failed to open snapshot file {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);
    let data = serde_json::from_reader(reader)
        .map_err(|e| anyhow!("Failed to parse snapshot file {}: {}", path.display(), e))?;
    Ok(data)
}
