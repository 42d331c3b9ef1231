use std::env;
use std::str::FromStr;

use super::error::{Result, StorageError};

/// Size of a page in bytes (8 KB)
pub const PAGE_SIZE: usize = 8192;

/// Size of the header at the start of every slotted page
pub const PAGE_HEADER_SIZE: usize = 24;

/// Size of one line pointer in a slotted page
pub const ITEM_ID_SIZE: usize = 4;

/// Size of the fixed heap tuple header
pub const HEAP_TUPLE_HEADER_SIZE: usize = 23;

/// Largest tuple the tuple layer may place on a single page
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE - ITEM_ID_SIZE;

/// Maximum number of columns in a table
pub const MAX_COLUMNS: usize = 1600;

/// Default buffer pool size (number of frames, 128 * 8 KB = 1 MB)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 128;

/// Default number of buffer pool instances
pub const DEFAULT_BUFFER_POOL_INSTANCES: usize = 1;

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default number of disk scheduler worker threads
pub const DEFAULT_DISK_WORKERS: usize = 2;

/// WAL segment size (16 MB)
pub const WAL_SEGMENT_SIZE: usize = 16 * 1024 * 1024;

/// WAL buffer size (16 MB)
pub const WAL_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Replacement policy used by a buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerKind {
    /// LRU-K with the given K
    LruK { k: usize },
    /// Second-chance clock
    Clock,
}

impl Default for ReplacerKind {
    fn default() -> Self {
        ReplacerKind::LruK { k: DEFAULT_LRUK_K }
    }
}

/// Runtime knobs for a buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames
    pub pool_size: usize,
    /// Replacement policy
    pub replacer: ReplacerKind,
    /// Number of disk scheduler worker threads
    pub disk_workers: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer: ReplacerKind::default(),
            disk_workers: DEFAULT_DISK_WORKERS,
        }
    }
}

impl BufferPoolConfig {
    pub const ENV_POOL_SIZE: &'static str = "BUFSTORE_POOL_SIZE";
    pub const ENV_REPLACER: &'static str = "BUFSTORE_REPLACER";
    pub const ENV_LRUK_K: &'static str = "BUFSTORE_LRUK_K";
    pub const ENV_DISK_WORKERS: &'static str = "BUFSTORE_DISK_WORKERS";

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_replacer(mut self, replacer: ReplacerKind) -> Self {
        self.replacer = replacer;
        self
    }

    pub fn with_disk_workers(mut self, disk_workers: usize) -> Self {
        self.disk_workers = disk_workers;
        self
    }

    /// Builds a config from the defaults, overridden by `BUFSTORE_*`
    /// environment variables where they are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(size) = parse_var::<usize, _>(&lookup, Self::ENV_POOL_SIZE)? {
            config.pool_size = size;
        }
        if let Some(workers) = parse_var::<usize, _>(&lookup, Self::ENV_DISK_WORKERS)? {
            config.disk_workers = workers;
        }

        let k = parse_var::<usize, _>(&lookup, Self::ENV_LRUK_K)?.unwrap_or(DEFAULT_LRUK_K);
        config.replacer = match lookup(Self::ENV_REPLACER).as_deref().map(str::trim) {
            None | Some("lru-k") | Some("lruk") => ReplacerKind::LruK { k },
            Some("clock") => ReplacerKind::Clock,
            Some(other) => {
                return Err(StorageError::Config(format!(
                    "{}: unknown replacer '{}'",
                    Self::ENV_REPLACER,
                    other
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the buffer pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(StorageError::Config("pool_size must be at least 1".into()));
        }
        if self.pool_size >= u32::MAX as usize {
            return Err(StorageError::Config(format!(
                "pool_size {} exceeds the frame id space",
                self.pool_size
            )));
        }
        if let ReplacerKind::LruK { k: 0 } = self.replacer {
            return Err(StorageError::Config("LRU-K requires k >= 1".into()));
        }
        if self.disk_workers == 0 {
            return Err(StorageError::Config(
                "disk_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StorageError::Config(format!("{}: cannot parse '{}'", key, raw))),
    }
}
