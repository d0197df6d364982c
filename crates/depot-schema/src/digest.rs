//! Multi-algorithm manifest digests.
//!
//! A [`ManifestDigest`] names one directory tree by the hash of its manifest
//! under one or more [`ManifestFormat`]s. The textual form is
//! `<algorithm>=<value>`, e.g. `sha1new=da39a3ee5e6b4b0d3255bfef95601890afd80709`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// A manifest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestFormat {
    /// Legacy SHA-1 format; directory lines carry an mtime.
    Sha1,
    /// SHA-1 over the current line format.
    Sha1New,
    /// SHA-256, hex encoded.
    Sha256,
    /// SHA-256, unpadded base32 encoded.
    Sha256New,
}

impl ManifestFormat {
    /// All formats, strongest first.
    pub const PREFERRED: [ManifestFormat; 4] = [
        ManifestFormat::Sha256New,
        ManifestFormat::Sha256,
        ManifestFormat::Sha1New,
        ManifestFormat::Sha1,
    ];

    /// The algorithm name used in digest identifiers and store directories.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha1New => "sha1new",
            Self::Sha256 => "sha256",
            Self::Sha256New => "sha256new",
        }
    }

    /// Look up a format by its algorithm name.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::PREFERRED.into_iter().find(|f| f.prefix() == prefix)
    }

    /// Position in [`Self::PREFERRED`]; lower is stronger.
    pub fn strength_rank(self) -> usize {
        Self::PREFERRED
            .iter()
            .position(|f| *f == self)
            .unwrap_or(Self::PREFERRED.len())
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for ManifestFormat {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_prefix(s).ok_or_else(|| SchemaError::InvalidDigest(s.to_string()))
    }
}

/// Hash values of one tree's manifest, one optional slot per algorithm.
///
/// Equality and hashing consider every slot. Use [`ManifestDigest::partial_match`]
/// to ask whether two digests plausibly describe the same tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestDigest {
    /// Legacy `sha1` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// `sha1new` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1new: Option<String>,
    /// `sha256` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// `sha256new` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256new: Option<String>,
}

impl ManifestDigest {
    /// Digest with a single populated slot.
    pub fn with(format: ManifestFormat, value: impl Into<String>) -> Self {
        let mut digest = Self::default();
        digest.set(format, value);
        digest
    }

    /// Parse an identifier such as `sha256new=ABC...` or `sha1new_abc...`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidDigest`] for unknown algorithms or an
    /// empty value.
    pub fn parse(id: &str) -> Result<Self, SchemaError> {
        let invalid = || SchemaError::InvalidDigest(id.to_string());
        let split = id.find(['=', '_']).ok_or_else(invalid)?;
        let (prefix, value) = (&id[..split], &id[split + 1..]);
        let format = ManifestFormat::from_prefix(prefix).ok_or_else(invalid)?;
        if value.is_empty() {
            return Err(invalid());
        }
        Ok(Self::with(format, value))
    }

    /// Value for `format`, if populated.
    pub fn get(&self, format: ManifestFormat) -> Option<&str> {
        match format {
            ManifestFormat::Sha1 => self.sha1.as_deref(),
            ManifestFormat::Sha1New => self.sha1new.as_deref(),
            ManifestFormat::Sha256 => self.sha256.as_deref(),
            ManifestFormat::Sha256New => self.sha256new.as_deref(),
        }
    }

    /// Populate the slot for `format`.
    pub fn set(&mut self, format: ManifestFormat, value: impl Into<String>) {
        let slot = match format {
            ManifestFormat::Sha1 => &mut self.sha1,
            ManifestFormat::Sha1New => &mut self.sha1new,
            ManifestFormat::Sha256 => &mut self.sha256,
            ManifestFormat::Sha256New => &mut self.sha256new,
        };
        *slot = Some(value.into());
    }

    /// Populated slots, strongest first.
    pub fn available(&self) -> impl Iterator<Item = (ManifestFormat, &str)> + '_ {
        ManifestFormat::PREFERRED
            .into_iter()
            .filter_map(|f| self.get(f).map(|v| (f, v)))
    }

    /// The strongest populated slot.
    pub fn best(&self) -> Option<(ManifestFormat, &str)> {
        self.available().next()
    }

    /// Identifier of the strongest slot, e.g. `sha256new=...`.
    pub fn best_id(&self) -> Option<String> {
        self.best().map(|(f, v)| format!("{}={v}", f.prefix()))
    }

    /// Identifiers of every populated slot, strongest first.
    pub fn ids(&self) -> Vec<String> {
        self.available()
            .map(|(f, v)| format!("{}={v}", f.prefix()))
            .collect()
    }

    /// Whether no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.best().is_none()
    }

    /// Whether both digests share at least one algorithm and agree on every
    /// algorithm they share.
    pub fn partial_match(&self, other: &ManifestDigest) -> bool {
        let mut shared = false;
        for format in ManifestFormat::PREFERRED {
            if let (Some(a), Some(b)) = (self.get(format), other.get(format)) {
                if a != b {
                    return false;
                }
                shared = true;
            }
        }
        shared
    }
}

impl fmt::Display for ManifestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = self.ids();
        if ids.is_empty() {
            f.write_str("(no digest)")
        } else {
            f.write_str(&ids.join(", "))
        }
    }
}

impl FromStr for ManifestDigest {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
