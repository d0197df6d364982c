//! Content-addressable implementation store.
//!
//! Each implementation lives in `<root>/<algorithm>=<value>`, named after the
//! strongest algorithm of its digest, with a cached `.manifest` inside.
//! New entries are assembled in a `.staging-*` directory on the same volume,
//! verified, and published with a single `rename`, so readers never observe a
//! partial entry. Every other algorithm of the published digest is recorded
//! as an alias under `<root>/.aliases`, so a weaker digest still finds the
//! entry. Writers serialize on one lock file per entry name under
//! `<root>/.locks`, taken strongest algorithm first.

use depot_schema::{Implementation, ManifestDigest, ManifestFormat, Selections};
use filetime::FileTime;
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::extract::{ArchiveFileInfo, ExtractError, extract_archive};
use crate::manifest::{self, ManifestError};

const STAGING_PREFIX: &str = ".staging-";
const DOWNLOAD_PREFIX: &str = ".download-";
const TRASH_PREFIX: &str = ".trash-";
const LOCK_DIR: &str = ".locks";
const ALIAS_DIR: &str = ".aliases";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Implementation {0} not found in store")]
    NotFound(String),

    #[error("Implementation {0} is already in the store")]
    AlreadyInStore(String),

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        expected: ManifestDigest,
        actual: ManifestDigest,
    },

    #[error(transparent)]
    Manifest(ManifestError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<ManifestError> for StoreError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::DigestMismatch { expected, actual } => {
                StoreError::DigestMismatch { expected, actual }
            }
            other => StoreError::Manifest(other),
        }
    }
}

/// A store entry that failed an audit.
#[derive(Debug)]
pub struct AuditFailure {
    pub digest: ManifestDigest,
    pub error: StoreError,
}

/// Handle to a store directory. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

/// Exclusive lock on one entry name, released on drop.
struct EntryLock {
    file: File,
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Store {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(LOCK_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_name(format: ManifestFormat, value: &str) -> String {
        format!("{}={value}", format.prefix())
    }

    /// Locate the entry for `digest`, trying its algorithms strongest first.
    ///
    /// The returned format is the one that matched; the path is always the
    /// entry directory itself, even when found through an alias.
    fn find(&self, digest: &ManifestDigest) -> Option<(ManifestFormat, PathBuf)> {
        digest.available().find_map(|(format, value)| {
            let name = Self::entry_name(format, value);
            let path = self.root.join(&name);
            if path.is_dir() {
                return Some((format, path));
            }
            self.resolve_alias(&name, digest).map(|path| (format, path))
        })
    }

    /// Follow the alias `name` to its entry, provided the digest recorded
    /// with the alias agrees with `digest` on every shared algorithm.
    fn resolve_alias(&self, name: &str, digest: &ManifestDigest) -> Option<PathBuf> {
        let body = fs::read_to_string(self.root.join(ALIAS_DIR).join(name)).ok()?;
        let (target, recorded) = parse_alias(&body)?;
        if !recorded.partial_match(digest) {
            warn!("Alias {} disagrees with {}; ignoring it", name, digest);
            return None;
        }
        let path = self.root.join(target);
        path.is_dir().then_some(path)
    }

    /// Record every name of `names` after the first as an alias of it.
    fn write_aliases(&self, names: &[String]) -> Result<(), StoreError> {
        if names.len() < 2 {
            return Ok(());
        }
        let dir = self.root.join(ALIAS_DIR);
        fs::create_dir_all(&dir)?;
        let body = format!("{}\n", names.join("\n"));
        for alias in &names[1..] {
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            file.write_all(body.as_bytes())?;
            file.persist(dir.join(alias)).map_err(|e| e.error)?;
        }
        Ok(())
    }

    /// Names of the aliases pointing at the entry `name`.
    fn aliases_of(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(self.root.join(ALIAS_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut aliases = Vec::new();
        for entry in entries {
            let entry = entry?;
            let points_here = fs::read_to_string(entry.path())
                .is_ok_and(|body| parse_alias(&body).is_some_and(|(target, _)| target == name));
            if points_here {
                if let Ok(alias) = entry.file_name().into_string() {
                    aliases.push(alias);
                }
            }
        }
        Ok(aliases)
    }

    /// Whether an entry for `digest` is present.
    pub fn contains(&self, digest: &ManifestDigest) -> bool {
        self.find(digest).is_some()
    }

    /// Path of the entry for `digest`.
    pub fn get_path(&self, digest: &ManifestDigest) -> Result<PathBuf, StoreError> {
        self.find(digest)
            .map(|(_, path)| path)
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))
    }

    /// Digests of every entry, sorted by name.
    pub fn list_all(&self) -> Result<Vec<ManifestDigest>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names
            .iter()
            .filter_map(|name| ManifestDigest::parse(name).ok())
            .collect())
    }

    /// Lock every name in `names`, strongest algorithm first. Writers whose
    /// digests overlap therefore always acquire shared names in one order.
    fn lock_all(&self, mut names: Vec<String>) -> Result<Vec<EntryLock>, StoreError> {
        names.sort_by_cached_key(|name| {
            let rank = ManifestDigest::parse(name)
                .ok()
                .and_then(|d| d.best().map(|(format, _)| format.strength_rank()))
                .unwrap_or(usize::MAX);
            (rank, name.clone())
        });
        names.dedup();
        names.iter().map(|name| self.lock(name)).collect()
    }

    fn lock(&self, name: &str) -> Result<EntryLock, StoreError> {
        let dir = self.root.join(LOCK_DIR);
        fs::create_dir_all(&dir)?;
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(format!("{name}.lock")))?;
        FileExt::lock_exclusive(&file)?;
        Ok(EntryLock { file })
    }

    /// Fresh staging directory inside the store root.
    pub fn stage(&self) -> Result<TempDir, StoreError> {
        Ok(tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)?)
    }

    /// Fresh download file inside the store root.
    pub fn download_file(&self) -> Result<tempfile::NamedTempFile, StoreError> {
        Ok(tempfile::Builder::new()
            .prefix(DOWNLOAD_PREFIX)
            .tempfile_in(&self.root)?)
    }

    /// Verify a staged tree against `digest` and publish it.
    ///
    /// The staging directory is deleted on any failure.
    pub fn commit(&self, staging: TempDir, digest: &ManifestDigest) -> Result<PathBuf, StoreError> {
        let names: Vec<String> = digest
            .available()
            .map(|(format, value)| Self::entry_name(format, value))
            .collect();
        let name = names.first().cloned().ok_or(ManifestError::EmptyDigest)?;
        let _locks = self.lock_all(names.clone())?;

        if self.contains(digest) {
            return Err(StoreError::AlreadyInStore(name));
        }

        let manifest = manifest::verify_tree(staging.path(), digest)?;
        if manifest.lines().is_empty() {
            warn!("Implementation {} is empty; nothing was retrieved", name);
        }
        manifest.save(staging.path())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755))?;
        }

        let target = self.root.join(&name);
        if let Err(e) = fs::rename(staging.path(), &target) {
            if target.exists() {
                return Err(StoreError::AlreadyInStore(name));
            }
            return Err(e.into());
        }
        info!("Added {} to store", name);
        if let Err(e) = self.write_aliases(&names) {
            warn!("Failed to record aliases of {}: {}", name, e);
        }
        Ok(target)
    }

    /// Copy `source` into the store as `digest`.
    pub fn add_directory(&self, source: &Path, digest: &ManifestDigest) -> Result<PathBuf, StoreError> {
        self.ensure_absent(digest)?;
        let staging = self.stage()?;
        copy_tree(source, staging.path())?;
        self.commit(staging, digest)
    }

    /// Extract one archive into the store as `digest`.
    pub fn add_archive(
        &self,
        archive: &ArchiveFileInfo,
        digest: &ManifestDigest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StoreError> {
        self.add_multiple_archives(std::slice::from_ref(archive), digest, cancel)
    }

    /// Extract several archives, in order, into one tree stored as `digest`.
    pub fn add_multiple_archives(
        &self,
        archives: &[ArchiveFileInfo],
        digest: &ManifestDigest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StoreError> {
        self.ensure_absent(digest)?;
        let staging = self.stage()?;
        for archive in archives {
            extract_archive(archive, staging.path(), cancel)?;
        }
        self.commit(staging, digest)
    }

    fn ensure_absent(&self, digest: &ManifestDigest) -> Result<(), StoreError> {
        match self.find(digest) {
            Some((format, _)) => Err(StoreError::AlreadyInStore(Self::entry_name(
                format,
                digest.get(format).unwrap_or_default(),
            ))),
            None => Ok(()),
        }
    }

    /// Delete the entry for `digest`.
    pub fn remove(&self, digest: &ManifestDigest) -> Result<(), StoreError> {
        let (_, path) = self
            .find(digest)
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))?;
        let aliases = self.aliases_of(&name)?;
        let mut names = aliases.clone();
        names.push(name.clone());
        let _locks = self.lock_all(names)?;

        let trash = tempfile::Builder::new()
            .prefix(TRASH_PREFIX)
            .tempdir_in(&self.root)?;
        fs::rename(&path, trash.path().join(&name)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(name.clone())
            } else {
                e.into()
            }
        })?;
        make_writable(trash.path());
        trash.close()?;
        for alias in &aliases {
            if let Err(e) = fs::remove_file(self.root.join(ALIAS_DIR).join(alias)) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        info!("Removed {} from store", name);
        Ok(())
    }

    /// Recompute the manifest of the entry for `digest` and compare.
    pub fn verify(&self, digest: &ManifestDigest) -> Result<(), StoreError> {
        let (format, path) = self
            .find(digest)
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))?;
        let expected = ManifestDigest::with(format, digest.get(format).unwrap_or_default());
        manifest::verify_tree(&path, &expected)?;
        debug!("Verified {}", expected);
        Ok(())
    }

    /// Verify every entry, returning the ones that fail.
    pub fn audit(&self) -> Result<Vec<AuditFailure>, StoreError> {
        let mut failures = Vec::new();
        for digest in self.list_all()? {
            if let Err(error) = self.verify(&digest) {
                warn!("Store entry {} failed verification: {}", digest, error);
                failures.push(AuditFailure { digest, error });
            }
        }
        Ok(failures)
    }

    /// Delete leftover staging, download and trash files from crashed runs,
    /// along with lock files and aliases whose entry is gone.
    ///
    /// Only safe while no other process is writing to the store.
    pub fn purge_staging(&self) -> Result<usize, StoreError> {
        let mut removed = self.purge_locks()? + self.purge_aliases()?;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if ![STAGING_PREFIX, DOWNLOAD_PREFIX, TRASH_PREFIX]
                .iter()
                .any(|p| name.starts_with(p))
            {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                make_writable(&path);
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            debug!("Purged {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }

    fn purge_locks(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for entry in fs::read_dir(self.root.join(LOCK_DIR))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn purge_aliases(&self) -> Result<usize, StoreError> {
        let entries = match fs::read_dir(self.root.join(ALIAS_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let live = fs::read_to_string(entry.path()).is_ok_and(|body| {
                parse_alias(&body).is_some_and(|(target, _)| self.root.join(target).is_dir())
            });
            if !live {
                debug!("Purged alias {}", entry.path().display());
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Implementations in `selections` that still need to be fetched.
    pub fn uncached(&self, selections: &Selections) -> Vec<Implementation> {
        selections
            .implementations
            .iter()
            .filter(|s| !s.digest.is_empty() && !self.contains(&s.digest))
            .map(depot_schema::ImplementationSelection::to_implementation)
            .collect()
    }
}

/// Split an alias file into its target entry name and the full digest that
/// was published under it.
fn parse_alias(body: &str) -> Option<(&str, ManifestDigest)> {
    let target = body.lines().next()?.trim();
    if target.is_empty() || target.starts_with('.') || target.contains(['/', '\\']) {
        return None;
    }
    let mut recorded = ManifestDigest::default();
    for line in body.lines() {
        let digest = ManifestDigest::parse(line.trim()).ok()?;
        let (format, value) = digest.best()?;
        recorded.set(format, value);
    }
    Some((target, recorded))
}

/// Copy a tree preserving permissions, symlinks and modification times.
fn copy_tree(source: &Path, dest: &Path) -> Result<(), StoreError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let out = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&out)?;
            dirs.push((out, entry.metadata().map_err(io::Error::from)?));
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &out)?;
            #[cfg(not(unix))]
            return Err(StoreError::Manifest(ManifestError::IllegalFileType(
                entry.path().to_path_buf(),
            )));
        } else {
            fs::copy(entry.path(), &out)?;
            let meta = entry.metadata().map_err(io::Error::from)?;
            filetime::set_file_mtime(&out, FileTime::from_last_modification_time(&meta))?;
        }
    }
    // Deepest first, after their contents stop changing.
    for (dir, meta) in dirs.iter().rev() {
        filetime::set_file_mtime(dir, FileTime::from_last_modification_time(meta))?;
    }
    Ok(())
}

/// Grant the owner write access throughout a tree so it can be deleted.
fn make_writable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_dir() {
                if let Ok(meta) = entry.metadata() {
                    let mode = meta.permissions().mode() | 0o700;
                    let _ = fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode));
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        for entry in WalkDir::new(path).into_iter().filter_map(Result::ok) {
            if let Ok(meta) = entry.metadata() {
                let mut perms = meta.permissions();
                if perms.readonly() {
                    #[allow(clippy::permissions_set_readonly_false)]
                    perms.set_readonly(false);
                    let _ = fs::set_permissions(entry.path(), perms);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_schema::{ImplementationSelection, mime};
    use tempfile::TempDir;

    fn source_tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/tool"), b"#!/bin/sh\necho hi\n").unwrap();
        fs::write(dir.path().join("README"), b"readme").unwrap();
        dir
    }

    fn digest_of(dir: &Path) -> ManifestDigest {
        manifest::digest_tree(dir, &[ManifestFormat::Sha256New, ManifestFormat::Sha1New]).unwrap()
    }

    fn open_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("implementations")).unwrap();
        (dir, store)
    }

    fn leftovers(store: &Store) -> Vec<String> {
        fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.unwrap().file_name().into_string().ok())
            .filter(|n| n.starts_with(STAGING_PREFIX) || n.starts_with(TRASH_PREFIX))
            .collect()
    }

    #[test]
    fn add_then_lookup() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());

        assert!(!store.contains(&digest));
        let path = store.add_directory(source.path(), &digest).unwrap();

        assert!(store.contains(&digest));
        assert_eq!(store.get_path(&digest).unwrap(), path);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            digest.best_id().unwrap()
        );
        assert!(path.join(manifest::MANIFEST_FILE).exists());
        store.verify(&digest).unwrap();

        // Entries are named after the strongest algorithm; weaker ones are aliases.
        let weak = ManifestDigest::with(
            ManifestFormat::Sha1New,
            digest.sha1new.clone().unwrap(),
        );
        assert!(store.contains(&weak));
        assert_eq!(store.get_path(&weak).unwrap(), path);
        store.verify(&weak).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert!(leftovers(&store).is_empty());
    }

    #[test]
    fn alias_with_conflicting_digest_is_ignored() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());
        store.add_directory(source.path(), &digest).unwrap();

        let mut conflicting = ManifestDigest::with(
            ManifestFormat::Sha256New,
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
        );
        conflicting.set(ManifestFormat::Sha1New, digest.sha1new.clone().unwrap());
        assert!(!store.contains(&conflicting));
    }

    #[test]
    fn weaker_digest_cannot_publish_a_second_copy() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());
        let weak = ManifestDigest::with(
            ManifestFormat::Sha1New,
            digest.sha1new.clone().unwrap(),
        );

        store.add_directory(source.path(), &digest).unwrap();
        let err = store.add_directory(source.path(), &weak).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyInStore(_)));
        let staging = store.stage().unwrap();
        copy_tree(source.path(), staging.path()).unwrap();
        assert!(matches!(
            store.commit(staging, &weak),
            Err(StoreError::AlreadyInStore(_))
        ));
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn remove_through_alias_drops_aliases() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());
        let weak = ManifestDigest::with(
            ManifestFormat::Sha1New,
            digest.sha1new.clone().unwrap(),
        );
        store.add_directory(source.path(), &digest).unwrap();

        store.remove(&weak).unwrap();
        assert!(!store.contains(&digest));
        assert!(!store.contains(&weak));
        let aliases = fs::read_dir(store.root().join(ALIAS_DIR)).unwrap().count();
        assert_eq!(aliases, 0);
    }

    #[test]
    fn double_add_is_rejected() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());

        store.add_directory(source.path(), &digest).unwrap();
        let err = store.add_directory(source.path(), &digest).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyInStore(_)));
        assert_eq!(store.list_all().unwrap().len(), 1);
        store.verify(&digest).unwrap();
    }

    #[test]
    fn mismatch_publishes_nothing() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let wrong = ManifestDigest::with(ManifestFormat::Sha1New, manifest::EMPTY_SHA1NEW);

        let err = store.add_directory(source.path(), &wrong).unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
        assert!(!store.contains(&wrong));
        assert!(leftovers(&store).is_empty());
    }

    #[test]
    fn missing_entries() {
        let (_tmp, store) = open_store();
        let digest = ManifestDigest::with(ManifestFormat::Sha1New, "0000");
        assert!(matches!(store.get_path(&digest), Err(StoreError::NotFound(_))));
        assert!(matches!(store.remove(&digest), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn remove_only_touches_target() {
        let (_tmp, store) = open_store();
        let one = source_tree();
        let two = tempfile::tempdir().unwrap();
        fs::write(two.path().join("other"), b"other").unwrap();
        let d1 = digest_of(one.path());
        let d2 = digest_of(two.path());
        store.add_directory(one.path(), &d1).unwrap();
        store.add_directory(two.path(), &d2).unwrap();

        store.remove(&d1).unwrap();
        assert!(!store.contains(&d1));
        assert!(store.contains(&d2));
        assert!(leftovers(&store).is_empty());
    }

    #[test]
    fn tampering_is_detected() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());
        let path = store.add_directory(source.path(), &digest).unwrap();

        fs::write(path.join("README"), b"READme").unwrap();
        assert!(matches!(
            store.verify(&digest),
            Err(StoreError::DigestMismatch { .. })
        ));
        let failures = store.audit().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].digest.best_id(), digest.best_id());
    }

    #[test]
    fn add_archive_extracts_and_verifies() {
        let (tmp, store) = open_store();
        let source = source_tree();
        let digest = digest_of(source.path());

        let mut builder = tar::Builder::new(Vec::new());
        builder.append_dir_all(".", source.path()).unwrap();
        let tarball = tmp.path().join("app.tar");
        fs::write(&tarball, builder.into_inner().unwrap()).unwrap();

        let info = ArchiveFileInfo {
            path: tarball,
            mime_type: mime::TAR.to_string(),
            start_offset: 0,
            extract: None,
            destination: None,
        };
        store
            .add_archive(&info, &digest, &CancellationToken::new())
            .unwrap();
        assert!(store.contains(&digest));
    }

    #[test]
    fn purge_removes_leftovers() {
        let (_tmp, store) = open_store();
        let staging = store.stage().unwrap();
        fs::write(staging.path().join("partial"), b"x").unwrap();
        let _kept = staging.keep();
        let (_file, _path) = store.download_file().unwrap().keep().unwrap();

        assert_eq!(store.purge_staging().unwrap(), 2);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn purge_clears_lock_files_and_dangling_aliases() {
        let (_tmp, store) = open_store();
        let one = source_tree();
        let two = tempfile::tempdir().unwrap();
        fs::write(two.path().join("other"), b"other").unwrap();
        let d1 = digest_of(one.path());
        let d2 = digest_of(two.path());
        let kept = store.add_directory(one.path(), &d1).unwrap();
        let gone = store.add_directory(two.path(), &d2).unwrap();

        // An entry deleted behind the store's back leaves its alias dangling.
        make_writable(&gone);
        fs::remove_dir_all(&gone).unwrap();

        let locks = || fs::read_dir(store.root().join(LOCK_DIR)).unwrap().count();
        assert_eq!(locks(), 4);
        assert_eq!(store.purge_staging().unwrap(), 5);
        assert_eq!(locks(), 0);

        let weak = ManifestDigest::with(ManifestFormat::Sha1New, d1.sha1new.clone().unwrap());
        assert_eq!(store.get_path(&weak).unwrap(), kept);
        assert!(!store.contains(&d2));
        store.verify(&d1).unwrap();
    }

    #[test]
    fn uncached_lists_missing() {
        let (_tmp, store) = open_store();
        let source = source_tree();
        let present = digest_of(source.path());
        store.add_directory(source.path(), &present).unwrap();

        let selection = |id: &str, digest: ManifestDigest| ImplementationSelection {
            interface: id.to_string(),
            id: id.to_string(),
            version: "1.0".parse().unwrap(),
            arch: depot_schema::Architecture::default(),
            digest,
            command: None,
            retrieval: Vec::new(),
            dependencies: Vec::new(),
        };
        let selections = Selections {
            interface: "a".into(),
            command: None,
            implementations: vec![
                selection("a", present),
                selection("b", ManifestDigest::with(ManifestFormat::Sha1New, "1234")),
            ],
        };
        let missing = store.uncached(&selections);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "b");
    }
}
