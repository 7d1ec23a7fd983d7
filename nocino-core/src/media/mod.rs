use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

// --- 1. Fetcher Capability ---

/// Resolves an attachment's file id to its bytes.
///
/// Implemented by the transport side (HTTP download in the service crate), so
/// the registry never talks to the chat service directly.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>>;
}

// --- 2. Registry ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Sticker,
    Clip,
}

impl MediaKind {
    /// Extension given to newly hoarded files.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Sticker => "webp",
            MediaKind::Clip => "mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Sticker => f.write_str("sticker"),
            MediaKind::Clip => f.write_str("clip"),
        }
    }
}

/// Append-only list of media files hoarded under one directory.
///
/// Every identifier is a file name inside `store`. Identifiers are only added
/// after the file was written, and never removed.
#[derive(Debug)]
pub struct MediaRegistry {
    kind: MediaKind,
    store: PathBuf,
    items: Mutex<Vec<String>>,
}

impl MediaRegistry {
    pub fn new(kind: MediaKind, store: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            store: store.into(),
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn store(&self) -> &Path {
        &self.store
    }

    pub fn path_of(&self, identifier: &str) -> PathBuf {
        self.store.join(identifier)
    }

    /// Creates the store directory if needed and registers the files already
    /// in it. An error here means the registry cannot work at all.
    pub async fn load_existing(&self) -> Result<usize> {
        if fs::metadata(&self.store).await.is_err() {
            warn!(
                kind = %self.kind,
                store = %self.store.display(),
                "Store directory does not exist, creating"
            );
            fs::create_dir_all(&self.store)
                .await
                .with_context(|| format!("cannot create directory '{}'", self.store.display()))?;
        }

        let mut entries = fs::read_dir(&self.store)
            .await
            .with_context(|| format!("cannot list directory '{}'", self.store.display()))?;

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => found.push(name),
                Err(name) => warn!(kind = %self.kind, name = ?name, "Skipping non UTF-8 file name"),
            }
        }
        found.sort();

        let mut items = self.items.lock().await;
        items.extend(found);
        info!(
            kind = %self.kind,
            store = %self.store.display(),
            count = items.len(),
            "Loaded media list"
        );
        Ok(items.len())
    }

    pub async fn add(&self, identifier: impl Into<String>) {
        self.items.lock().await.push(identifier.into());
    }

    /// Uniformly random identifier.
    ///
    /// # Panics
    ///
    /// Panics when the registry is empty. Callers check [`is_empty`](Self::is_empty) first.
    pub async fn get_random(&self) -> String {
        let items = self.items.lock().await;
        assert!(!items.is_empty(), "get_random called on an empty {} registry", self.kind);
        let idx = rand::thread_rng().gen_range(0..items.len());
        items[idx].clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Downloads `file_id` through `fetcher` and writes it to
    /// `store/<file_id>.<ext>`, returning the identifier to [`add`](Self::add).
    /// The list itself is left untouched.
    pub async fn hoard(&self, file_id: &str, fetcher: &dyn MediaFetcher) -> Result<String> {
        if file_id.is_empty()
            || file_id.contains(|c: char| c == '/' || c == '\\')
            || file_id.contains("..")
        {
            bail!("refusing to hoard {} with file id '{}'", self.kind, file_id);
        }

        info!(kind = %self.kind, file_id = %file_id, "Hoarding media");

        let bytes = fetcher
            .fetch(file_id)
            .await
            .with_context(|| format!("cannot fetch {} '{}'", self.kind, file_id))?;

        let identifier = format!("{}.{}", file_id, self.kind.extension());
        let path = self.path_of(&identifier);
        if let Err(e) = fs::write(&path, &bytes).await {
            let _ = fs::remove_file(&path).await;
            return Err(anyhow::Error::new(e)
                .context(format!("cannot write file '{}'", path.display())));
        }

        Ok(identifier)
    }
}
