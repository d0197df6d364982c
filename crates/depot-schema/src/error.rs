//! Error type shared by the schema parsers.

use thiserror::Error;

/// Errors raised while parsing schema values and documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A version string did not follow the dotted-list grammar.
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// An OS, CPU or `os-cpu` pair could not be parsed.
    #[error("Invalid architecture '{0}'")]
    InvalidArchitecture(String),

    /// A digest identifier was not of the form `<algorithm>=<value>`.
    #[error("Invalid manifest digest '{0}'")]
    InvalidDigest(String),

    /// A feed document failed to parse.
    #[error("Invalid feed document: {0}")]
    Feed(#[from] toml::de::Error),

    /// A selections document failed to parse or serialize.
    #[error("Invalid selections document: {0}")]
    Selections(#[from] serde_json::Error),
}
