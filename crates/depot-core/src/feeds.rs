//! Sources of feed documents for the solver.
//!
//! [`FeedCache`] reads TOML feeds from a directory (file names are the
//! percent-escaped interface URI plus `.toml`) or from a local path when the
//! interface is one. [`FeedSet`] holds feeds in memory.

use depot_schema::{Feed, SchemaError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to read feed {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid feed {path}: {source}")]
    Schema { path: PathBuf, source: SchemaError },
}

/// Supplies feeds by interface URI.
pub trait FeedProvider: Send + Sync {
    /// Feed for `interface`, or `None` if nothing is known about it.
    fn get_feed(&self, interface: &str) -> Result<Option<Arc<Feed>>, FeedError>;
}

impl<T: FeedProvider + ?Sized> FeedProvider for Arc<T> {
    fn get_feed(&self, interface: &str) -> Result<Option<Arc<Feed>>, FeedError> {
        (**self).get_feed(interface)
    }
}

/// In-memory feeds keyed by URI.
#[derive(Debug, Default, Clone)]
pub struct FeedSet {
    feeds: HashMap<String, Arc<Feed>>,
}

impl FeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feed: Feed) {
        self.feeds.insert(feed.uri.clone(), Arc::new(feed));
    }

    pub fn with(mut self, feed: Feed) -> Self {
        self.insert(feed);
        self
    }
}

impl FromIterator<Feed> for FeedSet {
    fn from_iter<I: IntoIterator<Item = Feed>>(iter: I) -> Self {
        let mut set = Self::new();
        for feed in iter {
            set.insert(feed);
        }
        set
    }
}

impl FeedProvider for FeedSet {
    fn get_feed(&self, interface: &str) -> Result<Option<Arc<Feed>>, FeedError> {
        Ok(self.feeds.get(interface).cloned())
    }
}

/// Directory of cached feed documents.
#[derive(Debug)]
pub struct FeedCache {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, Option<Arc<Feed>>>>,
}

impl FeedCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Cache file that holds the feed for `uri`.
    pub fn path_for(&self, uri: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", escape(uri)))
    }

    fn locate(&self, interface: &str) -> PathBuf {
        if !interface.contains("://") {
            let local = Path::new(interface);
            if local.is_file() {
                return local.to_path_buf();
            }
        }
        self.path_for(interface)
    }

    fn load(path: &Path) -> Result<Option<Feed>, FeedError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(FeedError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Feed::from_toml(&text)
            .map(Some)
            .map_err(|source| FeedError::Schema {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl FeedProvider for FeedCache {
    fn get_feed(&self, interface: &str) -> Result<Option<Arc<Feed>>, FeedError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(feed) = loaded.get(interface) {
            return Ok(feed.clone());
        }
        let path = self.locate(interface);
        let feed = Self::load(&path)?.map(Arc::new);
        tracing::debug!(
            "Feed {} -> {} ({})",
            interface,
            path.display(),
            if feed.is_some() { "found" } else { "missing" }
        );
        loaded.insert(interface.to_string(), feed.clone());
        Ok(feed)
    }
}

/// Percent-escape everything but ASCII alphanumerics and `-_.`.
fn escape(uri: &str) -> String {
    let mut out = String::with_capacity(uri.len());
    for byte in uri.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02x}"));
        }
    }
    out
}
