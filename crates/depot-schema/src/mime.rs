//! File-extension to MIME type table for archives.

/// Uncompressed tarball.
pub const TAR: &str = "application/x-tar";
/// Gzip-compressed tarball.
pub const TAR_GZIP: &str = "application/x-compressed-tar";
/// Bzip2-compressed tarball.
pub const TAR_BZIP2: &str = "application/x-bzip-compressed-tar";
/// LZMA-compressed tarball.
pub const TAR_LZMA: &str = "application/x-lzma-compressed-tar";
/// XZ-compressed tarball.
pub const TAR_XZ: &str = "application/x-xz-compressed-tar";
/// Zstandard-compressed tarball.
pub const TAR_ZSTD: &str = "application/x-zstd-compressed-tar";
/// ZIP archive.
pub const ZIP: &str = "application/zip";
/// Debian package.
pub const DEB: &str = "application/x-deb";
/// RPM package.
pub const RPM: &str = "application/x-rpm";
/// Microsoft cabinet.
pub const CAB: &str = "application/vnd.ms-cab-compressed";
/// Apple disk image.
pub const DMG: &str = "application/x-apple-diskimage";
/// 7-Zip archive.
pub const SEVEN_ZIP: &str = "application/x-7z-compressed";
/// Ruby gem.
pub const RUBY_GEM: &str = "application/x-ruby-gem";
/// Windows installer database.
pub const MSI: &str = "application/x-msi";

// Compound suffixes come before any suffix they end with.
const EXTENSIONS: &[(&str, &str)] = &[
    (".tar.gz", TAR_GZIP),
    (".tar.bz2", TAR_BZIP2),
    (".tar.lzma", TAR_LZMA),
    (".tar.xz", TAR_XZ),
    (".tar.zst", TAR_ZSTD),
    (".tgz", TAR_GZIP),
    (".tbz", TAR_BZIP2),
    (".tbz2", TAR_BZIP2),
    (".tlz", TAR_LZMA),
    (".txz", TAR_XZ),
    (".tzst", TAR_ZSTD),
    (".tar", TAR),
    (".zip", ZIP),
    (".jar", ZIP),
    (".deb", DEB),
    (".rpm", RPM),
    (".cab", CAB),
    (".dmg", DMG),
    (".7z", SEVEN_ZIP),
    (".gem", RUBY_GEM),
    (".msi", MSI),
];

/// Guess an archive's MIME type from the extension of its URL or file name.
///
/// Query strings and fragments are ignored and matching is case-insensitive.
pub fn guess_mime_type(href: &str) -> Option<&'static str> {
    let path = href.split(['?', '#']).next().unwrap_or(href).to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _)| path.ends_with(ext))
        .map(|(_, mime)| *mime)
}
