//! Feed documents: the implementations available for one interface.
//!
//! Feeds are TOML:
//!
//! ```toml
//! uri = "https://example.org/tool"
//! name = "tool"
//!
//! [[implementation]]
//! version = "1.2"
//! arch = "Linux-x86_64"
//! digest = { sha256new = "..." }
//!
//! [[implementation.retrieval]]
//! kind = "archive"
//! href = "https://example.org/tool-1.2.tar.gz"
//! size = 1024
//!
//! [[implementation.dependencies]]
//! interface = "https://example.org/lib"
//! not-before = "2.0"
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    Architecture, ImplementationVersion, ManifestDigest, RetrievalMethod, SchemaError,
    VersionRange,
};

/// A named entry point inside an implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command name, e.g. `run` or `compile`.
    pub name: String,
    /// Path relative to the implementation root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// A requirement on another interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Interface URI or feed path.
    pub interface: String,
    /// Acceptable versions.
    #[serde(flatten)]
    pub versions: VersionRange,
}

/// One concrete build of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Identifier, unique within its feed. Defaults to the best digest id.
    #[serde(default)]
    pub id: String,
    /// Version.
    pub version: ImplementationVersion,
    /// Target platform.
    #[serde(default)]
    pub arch: Architecture,
    /// Expected digest of the extracted tree.
    #[serde(default)]
    pub digest: ManifestDigest,
    /// Declared unpacked size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Ways to obtain the tree, in order of preference.
    #[serde(default)]
    pub retrieval: Vec<RetrievalMethod>,
    /// Other interfaces this implementation needs.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Entry points.
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl Implementation {
    /// Look up a command by name.
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Fill in the id and normalize retrieval methods.
    pub fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = self
                .digest
                .best_id()
                .unwrap_or_else(|| self.version.to_string());
        }
        for method in &mut self.retrieval {
            method.normalize();
        }
    }
}

/// All known implementations of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    /// Interface URI this feed describes.
    pub uri: String,
    /// Short human-readable name.
    #[serde(default)]
    pub name: String,
    /// One-line description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Available implementations.
    #[serde(default, rename = "implementation")]
    pub implementations: Vec<Implementation>,
}

impl Feed {
    /// Parse and normalize a TOML feed document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Feed`] if the document is malformed.
    pub fn from_toml(text: &str) -> Result<Self, SchemaError> {
        let mut feed: Feed = toml::from_str(text)?;
        for implementation in &mut feed.implementations {
            implementation.normalize();
        }
        Ok(feed)
    }

    /// Find an implementation by id.
    pub fn implementation(&self, id: &str) -> Option<&Implementation> {
        self.implementations.iter().find(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cpu, Os};

    const FEED: &str = r#"
uri = "https://example.org/tool"
name = "tool"

[[implementation]]
version = "1.2"
arch = "Linux-x86_64"
digest = { sha256new = "ABC" }

[[implementation.retrieval]]
kind = "archive"
href = "https://example.org/tool-1.2.tar.gz"
size = 1024

[[implementation.dependencies]]
interface = "https://example.org/lib"
not-before = "2.0"

[[implementation.commands]]
name = "run"
path = "bin/tool"

[[implementation]]
id = "custom"
version = "1.0"
"#;

    #[test]
    fn parses_and_normalizes() {
        let feed = Feed::from_toml(FEED).unwrap();
        assert_eq!(feed.implementations.len(), 2);

        let first = &feed.implementations[0];
        assert_eq!(first.id, "sha256new=ABC");
        assert_eq!(first.arch, Architecture::new(Os::Linux, Cpu::X86_64));
        let RetrievalMethod::Archive(archive) = &first.retrieval[0] else {
            panic!("expected archive");
        };
        assert_eq!(archive.mime_type.as_deref(), Some(crate::mime::TAR_GZIP));
        assert_eq!(
            first.dependencies[0].versions.not_before,
            Some("2.0".parse().unwrap())
        );
        assert_eq!(first.command("run").unwrap().path.as_deref(), Some("bin/tool"));

        let second = feed.implementation("custom").unwrap();
        assert_eq!(second.arch, Architecture::default());
        assert!(second.digest.is_empty());
    }

    #[test]
    fn rejects_bad_version() {
        let bad = "uri = \"x\"\n[[implementation]]\nversion = \"one\"\n";
        assert!(matches!(Feed::from_toml(bad), Err(SchemaError::Feed(_))));
    }
}
