//! The selections exchange document.
//!
//! Serialized as JSON. Entries keep solver order: the root interface first,
//! then its dependencies. Unknown fields are ignored on input so documents
//! written by newer versions still load.

use serde::{Deserialize, Serialize};

use crate::{
    Architecture, Dependency, Implementation, ImplementationVersion, ManifestDigest,
    RetrievalMethod, SchemaError,
};

/// The implementation chosen for one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationSelection {
    /// Interface this selection satisfies.
    pub interface: String,
    /// Implementation id within its feed.
    pub id: String,
    /// Selected version.
    pub version: ImplementationVersion,
    /// Architecture of the selected implementation.
    #[serde(default)]
    pub arch: Architecture,
    /// Expected digest of the tree.
    #[serde(default)]
    pub digest: ManifestDigest,
    /// Command chosen for this interface, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Snapshot of the feed's retrieval methods.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieval: Vec<RetrievalMethod>,
    /// Dependencies as declared by the implementation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl ImplementationSelection {
    /// Snapshot an implementation chosen for `interface`.
    pub fn from_implementation(
        interface: impl Into<String>,
        implementation: &Implementation,
        command: Option<String>,
    ) -> Self {
        Self {
            interface: interface.into(),
            id: implementation.id.clone(),
            version: implementation.version.clone(),
            arch: implementation.arch.clone(),
            digest: implementation.digest.clone(),
            command,
            retrieval: implementation.retrieval.clone(),
            dependencies: implementation.dependencies.clone(),
        }
    }

    /// Rebuild the implementation this selection was taken from, as far as
    /// the snapshot allows.
    pub fn to_implementation(&self) -> Implementation {
        Implementation {
            id: self.id.clone(),
            version: self.version.clone(),
            arch: self.arch.clone(),
            digest: self.digest.clone(),
            size: None,
            retrieval: self.retrieval.clone(),
            dependencies: self.dependencies.clone(),
            commands: Vec::new(),
        }
    }
}

/// Result of one solve: one implementation per required interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selections {
    /// Root interface.
    pub interface: String,
    /// Command requested on the root interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Chosen implementations, root first.
    #[serde(default)]
    pub implementations: Vec<ImplementationSelection>,
}

impl Selections {
    /// Selection for `interface`, if present.
    pub fn get(&self, interface: &str) -> Option<&ImplementationSelection> {
        self.implementations.iter().find(|s| s.interface == interface)
    }

    /// Selection for the root interface.
    pub fn root(&self) -> Option<&ImplementationSelection> {
        self.get(&self.interface)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Selections`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON selections document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Selections`] if the document is malformed.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Archive, ManifestFormat};

    fn sample() -> Selections {
        let mut archive = Archive::new("https://example.org/app.tar.gz");
        archive.size = Some(1024);
        archive.normalize();
        Selections {
            interface: "https://example.org/app".into(),
            command: Some("run".into()),
            implementations: vec![ImplementationSelection {
                interface: "https://example.org/app".into(),
                id: "sha256new=ABC".into(),
                version: "1.5".parse().unwrap(),
                arch: "Linux-x86_64".parse().unwrap(),
                digest: ManifestDigest::with(ManifestFormat::Sha256New, "ABC"),
                command: Some("run".into()),
                retrieval: vec![RetrievalMethod::Archive(archive)],
                dependencies: Vec::new(),
            }],
        }
    }

    #[test]
    fn json_roundtrip() {
        let selections = sample();
        let json = selections.to_json().unwrap();
        assert_eq!(Selections::from_json(&json).unwrap(), selections);
    }

    #[test]
    fn ignores_unknown_fields() {
        let json = r#"{
            "interface": "x",
            "generated-by": "future",
            "implementations": [
                {"interface": "x", "id": "a", "version": "1.0", "signature": "??"}
            ]
        }"#;
        let selections = Selections::from_json(json).unwrap();
        assert_eq!(selections.root().unwrap().id, "a");
    }

    #[test]
    fn accepts_newer_retrieval_kinds_and_architectures() {
        let json = r#"{
            "interface": "x",
            "implementations": [{
                "interface": "x",
                "id": "a",
                "version": "1.0",
                "arch": "Linux-riscv64",
                "retrieval": [
                    {"kind": "deb-package", "package": "tool"},
                    {"kind": "archive", "href": "https://example.org/a.tar.gz"}
                ]
            }]
        }"#;
        let selections = Selections::from_json(json).unwrap();
        let root = selections.root().unwrap();
        assert_eq!(root.arch.cpu, crate::Cpu::Other("riscv64".into()));
        assert!(!root.arch.is_compatible(&crate::Architecture::default()));
        assert_eq!(root.retrieval[0], RetrievalMethod::Unknown);
        assert!(matches!(root.retrieval[1], RetrievalMethod::Archive(_)));

        let again = Selections::from_json(&selections.to_json().unwrap()).unwrap();
        assert_eq!(again.root().unwrap().arch.to_string(), "Linux-riscv64");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Selections::from_json("{not json").is_err());
    }
}
