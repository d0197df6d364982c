//! Archive extraction and recipe step application.
//!
//! Everything here is blocking; the fetcher runs it on `spawn_blocking`.
//! Every path taken from an archive or a recipe is checked to stay inside
//! the destination directory, including through symlinks placed by earlier
//! entries.

use depot_schema::{Archive, RemoveStep, RenameStep, SingleFile, mime};
use filetime::FileTime;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Path escapes the destination directory: {0}")]
    UnsafePath(String),

    #[error("Path not found in the implementation: {0}")]
    MissingPath(String),

    #[error("Extraction cancelled")]
    Cancelled,
}

/// A downloaded archive and how to unpack it.
#[derive(Debug, Clone)]
pub struct ArchiveFileInfo {
    /// Local path of the downloaded file.
    pub path: PathBuf,
    pub mime_type: String,
    /// Bytes to skip before the archive data.
    pub start_offset: u64,
    /// Only unpack this sub-directory.
    pub extract: Option<String>,
    /// Unpack into this sub-directory of the destination.
    pub destination: Option<String>,
}

impl ArchiveFileInfo {
    /// Pair a downloaded file with its archive descriptor.
    pub fn from_archive(path: PathBuf, archive: &Archive) -> Result<Self, ExtractError> {
        let mut archive = archive.clone();
        archive.normalize();
        let mime_type = archive
            .mime_type
            .ok_or_else(|| ExtractError::UnsupportedFormat(archive.href.clone()))?;
        Ok(Self {
            path,
            mime_type,
            start_offset: archive.start_offset,
            extract: archive.extract,
            destination: archive.dest,
        })
    }
}

/// Unpack `info` into `dest`.
pub fn extract_archive(
    info: &ArchiveFileInfo,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    let target = match &info.destination {
        Some(sub) => dest.join(safe_relative(sub)?),
        None => dest.to_path_buf(),
    };
    if let Ok(rel) = target.strip_prefix(dest) {
        check_no_symlinks(dest, rel)?;
    }
    fs::create_dir_all(&target)?;

    let extract = info.extract.as_deref().map(safe_relative).transpose()?;
    let extract = extract.as_deref();

    let mut file = fs::File::open(&info.path)?;
    file.seek(SeekFrom::Start(info.start_offset))?;
    let reader = io::BufReader::new(file);

    tracing::debug!(
        "Extracting {} ({}) into {}",
        info.path.display(),
        info.mime_type,
        target.display()
    );

    match info.mime_type.as_str() {
        mime::TAR => unpack_tar(reader, &target, extract, cancel),
        mime::TAR_GZIP => unpack_tar(flate2::read::GzDecoder::new(reader), &target, extract, cancel),
        mime::TAR_XZ => unpack_tar(xz2::read::XzDecoder::new(reader), &target, extract, cancel),
        mime::TAR_ZSTD => unpack_tar(
            zstd::stream::read::Decoder::with_buffer(reader)?,
            &target,
            extract,
            cancel,
        ),
        mime::ZIP => {
            let file = fs::File::open(&info.path)?;
            let reader = OffsetReader::new(file, info.start_offset)?;
            unpack_zip(reader, &target, extract, cancel)
        }
        other => Err(ExtractError::UnsupportedFormat(other.to_string())),
    }
}

fn unpack_tar<R: Read>(
    reader: R,
    target: &Path,
    extract: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_mtime(true);
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);

    for entry in archive.entries()? {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let mut entry = entry?;
        let raw = entry.path()?.into_owned();
        let Some(rel) = filter_path(&raw, extract)? else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = target.join(&rel);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                check_no_symlinks(target, &rel)?;
                fs::create_dir_all(&out)?;
            }
            tar::EntryType::Link => {
                let link = entry
                    .link_name()?
                    .ok_or_else(|| ExtractError::UnsafePath(raw.display().to_string()))?
                    .into_owned();
                let Some(source) = filter_path(&link, extract)? else {
                    return Err(ExtractError::UnsafePath(link.display().to_string()));
                };
                check_no_symlinks(target, &source)?;
                prepare_file(target, &rel)?;
                fs::copy(target.join(&source), &out)?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous | tar::EntryType::GNUSparse => {
                prepare_file(target, &rel)?;
                entry.unpack(&out)?;
                // Drop special mode bits, as for zip entries.
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mode = entry.header().mode()? & 0o777;
                    fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
                }
            }
            tar::EntryType::Symlink => {
                prepare_file(target, &rel)?;
                entry.unpack(&out)?;
            }
            other => {
                tracing::warn!("Skipping unsupported tar entry {:?}: {}", other, raw.display());
            }
        }
    }
    Ok(())
}

fn unpack_zip<R: Read + Seek>(
    reader: R,
    target: &Path,
    extract: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    let mut archive = zip::ZipArchive::new(reader)?;

    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let mut file = archive.by_index(i)?;
        let name = file
            .enclosed_name()
            .ok_or_else(|| ExtractError::UnsafePath(file.name().to_string()))?;
        let Some(rel) = filter_path(&name, extract)? else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = target.join(&rel);

        if file.is_dir() {
            check_no_symlinks(target, &rel)?;
            fs::create_dir_all(&out)?;
            continue;
        }

        prepare_file(target, &rel)?;
        if file.is_symlink() {
            let mut link = String::new();
            file.read_to_string(&mut link)?;
            write_symlink(&link, &out)?;
            continue;
        }

        let mut writer = fs::File::create(&out)?;
        io::copy(&mut file, &mut writer)?;
        drop(writer);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))?;
            }
        }
        if let Some(mtime) = file.last_modified().and_then(zip_mtime) {
            filetime::set_file_mtime(&out, mtime)?;
        }
    }
    Ok(())
}

fn zip_mtime(dt: zip::DateTime) -> Option<FileTime> {
    let naive = chrono::NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?
    .and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )?;
    Some(FileTime::from_unix_time(naive.and_utc().timestamp(), 0))
}

#[cfg(unix)]
fn write_symlink(link: &str, out: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, out)
}

#[cfg(not(unix))]
fn write_symlink(link: &str, out: &Path) -> io::Result<()> {
    fs::write(out, link)
}

/// Copy a downloaded file into the tree at `file.dest`.
///
/// The mtime is pinned to the Unix epoch so the manifest does not depend on
/// when the download happened.
pub fn apply_single_file(
    downloaded: &Path,
    dest: &Path,
    file: &SingleFile,
) -> Result<(), ExtractError> {
    let rel = safe_relative(&file.dest)?;
    if rel.as_os_str().is_empty() {
        return Err(ExtractError::UnsafePath(file.dest.clone()));
    }
    prepare_file(dest, &rel)?;
    let out = dest.join(&rel);
    fs::copy(downloaded, &out)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if file.executable { 0o755 } else { 0o644 };
        fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
    }
    filetime::set_file_mtime(&out, FileTime::zero())?;
    Ok(())
}

/// Delete a file or directory placed by an earlier step.
pub fn apply_remove(dest: &Path, step: &RemoveStep) -> Result<(), ExtractError> {
    let path = existing(dest, &step.path)?;
    if fs::symlink_metadata(&path)?.is_dir() {
        fs::remove_dir_all(&path)?;
    } else {
        fs::remove_file(&path)?;
    }
    Ok(())
}

/// Move a file or directory placed by an earlier step.
pub fn apply_rename(dest: &Path, step: &RenameStep) -> Result<(), ExtractError> {
    let source = existing(dest, &step.source)?;
    let rel = safe_relative(&step.destination)?;
    if rel.as_os_str().is_empty() {
        return Err(ExtractError::UnsafePath(step.destination.clone()));
    }
    prepare_file(dest, &rel)?;
    fs::rename(source, dest.join(rel))?;
    Ok(())
}

fn existing(dest: &Path, raw: &str) -> Result<PathBuf, ExtractError> {
    let rel = safe_relative(raw)?;
    if rel.as_os_str().is_empty() {
        return Err(ExtractError::UnsafePath(raw.to_string()));
    }
    check_no_symlinks(dest, rel.parent().unwrap_or(Path::new("")))?;
    let path = dest.join(&rel);
    if fs::symlink_metadata(&path).is_err() {
        return Err(ExtractError::MissingPath(raw.to_string()));
    }
    Ok(path)
}

/// Normalize a relative path, rejecting anything that could leave the root.
fn safe_relative(raw: &str) -> Result<PathBuf, ExtractError> {
    normalize(Path::new(raw)).ok_or_else(|| ExtractError::UnsafePath(raw.to_string()))
}

fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Map an archive path through the `extract` sub-directory filter.
fn filter_path(raw: &Path, extract: Option<&Path>) -> Result<Option<PathBuf>, ExtractError> {
    let path = normalize(raw).ok_or_else(|| ExtractError::UnsafePath(raw.display().to_string()))?;
    match extract {
        None => Ok(Some(path)),
        Some(prefix) => Ok(path.strip_prefix(prefix).ok().map(Path::to_path_buf)),
    }
}

/// Fail if any existing component of `rel` under `root` is a symlink.
fn check_no_symlinks(root: &Path, rel: &Path) -> Result<(), ExtractError> {
    let mut current = root.to_path_buf();
    for component in rel.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ExtractError::UnsafePath(rel.display().to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Create the parent of `rel` and clear a non-directory already at `rel`.
fn prepare_file(root: &Path, rel: &Path) -> Result<(), ExtractError> {
    if let Some(parent) = rel.parent() {
        check_no_symlinks(root, parent)?;
        fs::create_dir_all(root.join(parent))?;
    }
    let out = root.join(rel);
    if let Ok(meta) = fs::symlink_metadata(&out) {
        if !meta.is_dir() {
            fs::remove_file(&out)?;
        }
    }
    Ok(())
}

/// Presents a file without its first `offset` bytes.
struct OffsetReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Seek> OffsetReader<R> {
    fn new(mut inner: R, offset: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self { inner, offset })
    }
}

impl<R: Read> Read for OffsetReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Seek> Seek for OffsetReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let absolute = match pos {
            SeekFrom::Start(n) => self.inner.seek(SeekFrom::Start(n + self.offset))?,
            other => self.inner.seek(other)?,
        };
        if absolute < self.offset {
            self.inner.seek(SeekFrom::Start(self.offset))?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of archive",
            ));
        }
        Ok(absolute - self.offset)
    }
}
