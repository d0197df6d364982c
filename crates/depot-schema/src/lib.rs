//! Shared types for depot.
//!
//! Everything in this crate is a plain value: feeds, implementations,
//! retrieval descriptors, digests and the selections exchange document.
//! No I/O happens here beyond parsing and serializing documents.

pub mod arch;
pub mod digest;
pub mod error;
pub mod feed;
pub mod mime;
pub mod requirements;
pub mod retrieval;
pub mod selections;
pub mod version;

// Re-exports
pub use arch::{Architecture, Cpu, Os};
pub use digest::{ManifestDigest, ManifestFormat};
pub use error::SchemaError;
pub use feed::{Command, Dependency, Feed, Implementation};
pub use requirements::Requirements;
pub use retrieval::{Archive, Recipe, RecipeStep, RemoveStep, RenameStep, RetrievalMethod, SingleFile};
pub use selections::{ImplementationSelection, Selections};
pub use version::{ImplementationVersion, VersionRange};
