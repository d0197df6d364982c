//! Deterministic manifests of directory trees.
//!
//! A manifest is one line per entry of a tree:
//!
//! ```text
//! D /sub                                  directory
//! F <hash> <mtime> <size> <name>          regular file
//! X <hash> <mtime> <size> <name>          executable file
//! S <hash> <size> <name>                  symlink (hash of the target)
//! ```
//!
//! Inside each directory, files and symlinks are listed first, then each
//! subdirectory's `D` line followed by its contents, all sorted by the bytes
//! of their names. The legacy `sha1` format instead interleaves everything
//! in one sorted list and writes directories as `D <mtime> /sub`.
//!
//! The digest of a tree is the hash of its serialized manifest. A top-level
//! `.manifest` file (the store's cached copy) is never part of the walk.

use depot_schema::{ManifestDigest, ManifestFormat};
use filetime::FileTime;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// `sha1new` digest of an empty tree.
pub const EMPTY_SHA1NEW: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

/// File name of the cached manifest inside a store entry.
pub const MANIFEST_FILE: &str = ".manifest";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Unsupported file type: {0}")]
    IllegalFileType(PathBuf),

    #[error("File name cannot be recorded in a manifest: {0}")]
    IllegalName(PathBuf),

    #[error("File system does not provide modification times: {0}")]
    InsufficientPrecision(PathBuf),

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        expected: ManifestDigest,
        actual: ManifestDigest,
    },

    #[error("No digest to verify against")]
    EmptyDigest,
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ManifestError + '_ {
    move |source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The serialized form of one tree under one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    format: ManifestFormat,
    lines: Vec<String>,
}

impl Manifest {
    /// Walk `root` and build its manifest.
    pub fn generate(root: &Path, format: ManifestFormat) -> Result<Self, ManifestError> {
        let mut lines = Vec::new();
        walk(root, root, format, &mut lines)?;
        Ok(Self { format, lines })
    }

    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Manifest text, every line terminated by `\n`.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Digest value of the serialized text in this manifest's encoding.
    pub fn digest_value(&self) -> String {
        let text = self.serialize();
        match self.format {
            ManifestFormat::Sha1 | ManifestFormat::Sha1New => {
                hex::encode(Sha1::digest(text.as_bytes()))
            }
            ManifestFormat::Sha256 => hex::encode(Sha256::digest(text.as_bytes())),
            ManifestFormat::Sha256New => base32::encode(
                base32::Alphabet::Rfc4648 { padding: false },
                &Sha256::digest(text.as_bytes()),
            ),
        }
    }

    /// Single-slot digest for this manifest's format.
    pub fn digest(&self) -> ManifestDigest {
        ManifestDigest::with(self.format, self.digest_value())
    }

    /// Write the manifest to `<dir>/.manifest`.
    pub fn save(&self, dir: &Path) -> Result<(), ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, self.serialize()).map_err(io_err(&path))
    }
}

/// Compute the digest of `root` under each of `formats`.
pub fn digest_tree(root: &Path, formats: &[ManifestFormat]) -> Result<ManifestDigest, ManifestError> {
    let mut digest = ManifestDigest::default();
    for &format in formats {
        let manifest = Manifest::generate(root, format)?;
        digest.set(format, manifest.digest_value());
    }
    Ok(digest)
}

/// Check `root` against every algorithm `expected` declares.
///
/// Returns the manifest for the strongest declared algorithm on success.
pub fn verify_tree(root: &Path, expected: &ManifestDigest) -> Result<Manifest, ManifestError> {
    let mut manifests = Vec::new();
    let mut actual = ManifestDigest::default();
    for (format, _) in expected.available() {
        let manifest = Manifest::generate(root, format)?;
        actual.set(format, manifest.digest_value());
        manifests.push(manifest);
    }

    if manifests.is_empty() {
        return Err(ManifestError::EmptyDigest);
    }
    if actual != *expected {
        return Err(ManifestError::DigestMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(manifests.swap_remove(0))
}

enum Kind {
    Dir,
    File { executable: bool },
    Symlink,
}

struct Entry {
    name: String,
    path: PathBuf,
    kind: Kind,
    meta: fs::Metadata,
}

fn read_entries(root: &Path, dir: &Path) -> Result<Vec<Entry>, ManifestError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| ManifestError::IllegalName(path.clone()))?;
        if name.contains(['\n', '\r']) {
            return Err(ManifestError::IllegalName(path));
        }
        if dir == root && name == MANIFEST_FILE {
            continue;
        }

        let meta = fs::symlink_metadata(&path).map_err(io_err(&path))?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            Kind::Symlink
        } else if file_type.is_dir() {
            Kind::Dir
        } else if file_type.is_file() {
            Kind::File {
                executable: is_executable(&meta),
            }
        } else {
            return Err(ManifestError::IllegalFileType(path));
        };
        entries.push(Entry {
            name,
            path,
            kind,
            meta,
        });
    }
    entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    Ok(entries)
}

fn walk(
    root: &Path,
    dir: &Path,
    format: ManifestFormat,
    lines: &mut Vec<String>,
) -> Result<(), ManifestError> {
    let entries = read_entries(root, dir)?;

    if format == ManifestFormat::Sha1 {
        for entry in &entries {
            if let Kind::Dir = entry.kind {
                let mtime = mtime_secs(&entry.path, &entry.meta)?;
                lines.push(format!("D {mtime} {}", relative(root, &entry.path)));
                walk(root, &entry.path, format, lines)?;
            } else {
                lines.push(leaf_line(entry, format)?);
            }
        }
        return Ok(());
    }

    for entry in entries.iter().filter(|e| !matches!(e.kind, Kind::Dir)) {
        lines.push(leaf_line(entry, format)?);
    }
    for entry in entries.iter().filter(|e| matches!(e.kind, Kind::Dir)) {
        lines.push(format!("D {}", relative(root, &entry.path)));
        walk(root, &entry.path, format, lines)?;
    }
    Ok(())
}

fn leaf_line(entry: &Entry, format: ManifestFormat) -> Result<String, ManifestError> {
    match entry.kind {
        Kind::File { executable } => {
            let file = fs::File::open(&entry.path).map_err(io_err(&entry.path))?;
            let hash = hash_reader(format, file).map_err(io_err(&entry.path))?;
            let mtime = mtime_secs(&entry.path, &entry.meta)?;
            let flag = if executable { 'X' } else { 'F' };
            Ok(format!(
                "{flag} {hash} {mtime} {} {}",
                entry.meta.len(),
                entry.name
            ))
        }
        Kind::Symlink => {
            let target = fs::read_link(&entry.path).map_err(io_err(&entry.path))?;
            let target = target
                .to_str()
                .ok_or_else(|| ManifestError::IllegalName(entry.path.clone()))?;
            let hash = hash_reader(format, target.as_bytes()).map_err(io_err(&entry.path))?;
            Ok(format!("S {hash} {} {}", target.len(), entry.name))
        }
        Kind::Dir => Err(ManifestError::IllegalFileType(entry.path.clone())),
    }
}

fn hash_reader(format: ManifestFormat, mut reader: impl Read) -> io::Result<String> {
    match format {
        ManifestFormat::Sha1 | ManifestFormat::Sha1New => {
            let mut hasher = Sha1::new();
            io::copy(&mut reader, &mut hasher)?;
            Ok(hex::encode(hasher.finalize()))
        }
        ManifestFormat::Sha256 | ManifestFormat::Sha256New => {
            let mut hasher = Sha256::new();
            io::copy(&mut reader, &mut hasher)?;
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

fn mtime_secs(path: &Path, meta: &fs::Metadata) -> Result<i64, ManifestError> {
    unix_seconds(path, meta.modified())
}

/// Whole seconds of a modification time, failing when the platform cannot
/// report one.
fn unix_seconds(path: &Path, modified: io::Result<SystemTime>) -> Result<i64, ManifestError> {
    let modified = modified.map_err(|_| ManifestError::InsufficientPrecision(path.to_path_buf()))?;
    Ok(FileTime::from_system_time(modified).unix_seconds())
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in rel.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}
