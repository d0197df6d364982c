//! Solve requests.

use serde::{Deserialize, Serialize};

use crate::{Architecture, ImplementationVersion, VersionRange};

/// What the caller wants solved: an interface plus constraints on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    /// Interface URI or local feed path.
    pub interface: String,
    /// Command the selected implementation must provide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Acceptable versions of the root interface.
    #[serde(default)]
    pub versions: VersionRange,
    /// Platform to select for.
    pub architecture: Architecture,
}

impl Requirements {
    /// Requirements for `interface` on the running host, any version.
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            command: None,
            versions: VersionRange::any(),
            architecture: Architecture::current(),
        }
    }

    /// Require a command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Exclusive upper version bound.
    pub fn before(mut self, version: ImplementationVersion) -> Self {
        self.versions.before = Some(version);
        self
    }

    /// Inclusive lower version bound.
    pub fn not_before(mut self, version: ImplementationVersion) -> Self {
        self.versions.not_before = Some(version);
        self
    }

    /// Target platform.
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }
}
