//! Retrieval of implementations into the store.
//!
//! For each implementation the [`Fetcher`] tries its retrieval methods in
//! feed order. A method downloads into `.download-*` files inside the store
//! root, checks the byte count against the declared size, unpacks into a
//! staging directory and hands that to [`Store::commit`], which verifies the
//! manifest digest before publishing. Any failure discards the temporaries
//! and moves on to the next method.

pub mod transport;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use depot_schema::{
    Implementation, ManifestDigest, Recipe, RecipeStep, RetrievalMethod, Selections,
};
use futures::StreamExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::extract::{
    self, ArchiveFileInfo, ExtractError, apply_remove, apply_rename, apply_single_file,
};
use crate::store::{Store, StoreError};
use crate::{NullReporter, Reporter};

pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Size mismatch for {url}: expected {expected} bytes, got {actual}")]
    Integrity {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Extract(ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Implementation {0} has no digest")]
    MissingDigest(String),

    #[error("Implementation {0} has no retrieval methods")]
    NoRetrievalMethods(String),

    #[error("Implementation {0} has no retrieval method this version understands")]
    UnsupportedMethods(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl From<ExtractError> for FetchError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Cancelled => FetchError::Cancelled,
            other => FetchError::Extract(other),
        }
    }
}

impl From<StoreError> for FetchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Extract(inner) => inner.into(),
            other => FetchError::Store(other),
        }
    }
}

/// Downloads implementations into a [`Store`].
pub struct Fetcher {
    store: Store,
    transport: Arc<dyn Transport>,
    reporter: Arc<dyn Reporter>,
    max_parallel: usize,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(store: Store, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            reporter: Arc::new(NullReporter),
            max_parallel: num_cpus::get().max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Use `token` as the parent of every fetch; cancelling it stops them all.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetch every implementation, failing with the first error.
    ///
    /// All fetches run to completion before the error is returned, so
    /// unrelated implementations still land in the store.
    pub async fn fetch(&self, implementations: &[Implementation]) -> Result<Vec<PathBuf>, FetchError> {
        if implementations.is_empty() {
            return Ok(Vec::new());
        }
        self.reporter.section("Fetching");

        let results = self.fetch_each(implementations).await;
        let mut paths = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (implementation, result) in implementations.iter().zip(results) {
            match result {
                Ok(path) => paths.push(path),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!("Also failed to fetch {}: {}", implementation.id, e),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(paths),
        }
    }

    /// Fetch whatever `selections` needs that the store lacks.
    pub async fn fetch_uncached(&self, selections: &Selections) -> Result<Vec<PathBuf>, FetchError> {
        let missing = self.store.uncached(selections);
        debug!("{} of {} selections need fetching", missing.len(), selections.implementations.len());
        self.fetch(&missing).await
    }

    /// Fetch every implementation, up to `max_parallel` at once, returning
    /// one result per input in input order.
    pub async fn fetch_each(
        &self,
        implementations: &[Implementation],
    ) -> Vec<Result<PathBuf, FetchError>> {
        futures::stream::iter(implementations)
            .map(|implementation| self.fetch_one(implementation))
            .buffered(self.max_parallel)
            .collect()
            .await
    }

    /// Fetch one implementation under a child of the fetcher's token.
    pub async fn fetch_one(&self, implementation: &Implementation) -> Result<PathBuf, FetchError> {
        self.fetch_one_with(implementation, &self.cancel.child_token())
            .await
    }

    /// Fetch one implementation, stopping early if `cancel` fires.
    pub async fn fetch_one_with(
        &self,
        implementation: &Implementation,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        let id = implementation.id.as_str();
        if implementation.digest.is_empty() {
            return Err(FetchError::MissingDigest(id.to_string()));
        }
        if let Ok(path) = self.store.get_path(&implementation.digest) {
            debug!("{} already in store", id);
            return Ok(path);
        }

        let mut last_error = None;
        for method in &implementation.retrieval {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if !method.is_supported() {
                warn!("Skipping unsupported retrieval method for {}", id);
                last_error.get_or_insert_with(|| FetchError::UnsupportedMethods(id.to_string()));
                continue;
            }
            let mut method = method.clone();
            method.normalize();

            match self.try_method(implementation, &method, cancel).await {
                Ok(path) => {
                    self.reporter.done(id, &path.display().to_string());
                    return Ok(path);
                }
                Err(FetchError::Store(StoreError::AlreadyInStore(_))) => {
                    // Another fetch published the same tree first.
                    return Ok(self.store.get_path(&implementation.digest)?);
                }
                Err(FetchError::Cancelled) => {
                    self.reporter.failed(id, "cancelled");
                    return Err(FetchError::Cancelled);
                }
                Err(e) => {
                    warn!("Retrieval method for {} failed: {}", id, e);
                    last_error = Some(e);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| FetchError::NoRetrievalMethods(id.to_string()));
        self.reporter.failed(id, &err.to_string());
        Err(err)
    }

    async fn try_method(
        &self,
        implementation: &Implementation,
        method: &RetrievalMethod,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        let id = implementation.id.as_str();
        let digest = implementation.digest.clone();
        let store = self.store.clone();
        let cancel_blocking = cancel.clone();

        match method {
            RetrievalMethod::Archive(archive) => {
                let download = self
                    .download(&archive.href, archive.download_size(), id, cancel)
                    .await?;
                let info = ArchiveFileInfo::from_archive(download.path().to_path_buf(), archive)?;
                self.reporter.extracting(id);
                run_blocking(move || {
                    let result = store.add_archive(&info, &digest, &cancel_blocking);
                    drop(download);
                    Ok(result?)
                })
                .await
            }
            RetrievalMethod::SingleFile(file) => {
                let download = self.download(&file.href, file.size, id, cancel).await?;
                let file = file.clone();
                run_blocking(move || {
                    let staging = store.stage()?;
                    apply_single_file(download.path(), staging.path(), &file)?;
                    Ok(store.commit(staging, &digest)?)
                })
                .await
            }
            RetrievalMethod::Recipe(recipe) => {
                let downloads = self.download_recipe(recipe, id, cancel).await?;
                let steps = recipe.steps.clone();
                self.reporter.extracting(id);
                run_blocking(move || {
                    apply_recipe(&store, &steps, &downloads, &digest, &cancel_blocking)
                })
                .await
            }
            RetrievalMethod::Unknown => Err(FetchError::UnsupportedMethods(id.to_string())),
        }
    }

    /// Download every step's payload before anything is applied. On error the
    /// files downloaded so far are dropped, which deletes them.
    async fn download_recipe(
        &self,
        recipe: &Recipe,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<NamedTempFile>>, FetchError> {
        let mut downloads = Vec::with_capacity(recipe.steps.len());
        for step in &recipe.steps {
            let download = match step {
                RecipeStep::Archive(archive) => Some(
                    self.download(&archive.href, archive.download_size(), id, cancel)
                        .await?,
                ),
                RecipeStep::SingleFile(file) => {
                    Some(self.download(&file.href, file.size, id, cancel).await?)
                }
                RecipeStep::Remove(_) | RecipeStep::Rename(_) => None,
                RecipeStep::Unknown => return Err(FetchError::UnsupportedMethods(id.to_string())),
            };
            downloads.push(download);
        }
        Ok(downloads)
    }

    /// Stream `url` into a temporary file in the store root, enforcing
    /// `expected_size` before and after the transfer.
    async fn download(
        &self,
        url: &str,
        expected_size: Option<u64>,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<NamedTempFile, FetchError> {
        let temp = self.store.download_file()?;
        debug!("Downloading {} -> {}", url, temp.path().display());

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.transport.open(url) => response?,
        };

        if let (Some(expected), Some(announced)) = (expected_size, response.content_length) {
            if expected != announced {
                return Err(FetchError::Integrity {
                    url: url.to_string(),
                    expected,
                    actual: announced,
                });
            }
        }

        let total = expected_size.or(response.content_length);
        let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        let mut body = response.body;
        let mut received: u64 = 0;
        self.reporter.downloading(id, 0, total);

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            received += chunk.len() as u64;
            if let Some(expected) = expected_size {
                if received > expected {
                    return Err(FetchError::Integrity {
                        url: url.to_string(),
                        expected,
                        actual: received,
                    });
                }
            }
            file.write_all(&chunk).await?;
            self.reporter.downloading(id, received, total);
        }
        file.flush().await?;

        if let Some(expected) = expected_size {
            if received != expected {
                return Err(FetchError::Integrity {
                    url: url.to_string(),
                    expected,
                    actual: received,
                });
            }
        }
        Ok(temp)
    }
}

async fn run_blocking<F>(f: F) -> Result<PathBuf, FetchError>
where
    F: FnOnce() -> Result<PathBuf, FetchError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

fn apply_recipe(
    store: &Store,
    steps: &[RecipeStep],
    downloads: &[Option<NamedTempFile>],
    digest: &ManifestDigest,
    cancel: &CancellationToken,
) -> Result<PathBuf, FetchError> {
    let staging = store.stage()?;
    for (step, download) in steps.iter().zip(downloads) {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        match (step, download) {
            (RecipeStep::Archive(archive), Some(file)) => {
                let info = ArchiveFileInfo::from_archive(file.path().to_path_buf(), archive)?;
                extract::extract_archive(&info, staging.path(), cancel)?;
            }
            (RecipeStep::SingleFile(single), Some(file)) => {
                apply_single_file(file.path(), staging.path(), single)?;
            }
            (RecipeStep::Remove(step), _) => apply_remove(staging.path(), step)?,
            (RecipeStep::Rename(step), _) => apply_rename(staging.path(), step)?,
            (RecipeStep::Archive(_) | RecipeStep::SingleFile(_), None) => {
                return Err(io::Error::other("recipe step has no downloaded payload").into());
            }
            (RecipeStep::Unknown, _) => {
                return Err(io::Error::other("recipe step kind is not supported").into());
            }
        }
    }
    Ok(store.commit(staging, digest)?)
}
