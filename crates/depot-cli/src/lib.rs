//! depot - select, fetch and store verified implementations
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! A thin command-line front end over `depot-core`.
//!
//! # Directory Layout
//!
//! ```text
//! $DEPOT_HOME/              (default: <cache dir>/depot)
//! ├── implementations/      # Content-addressed store, one dir per digest
//! ├── feeds/                # Cached feed documents (TOML)
//! └── config.toml           # Optional settings
//! ```

pub mod cmd;
pub mod ui;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Parser, Subcommand};
use depot_schema::{Architecture, Cpu, ImplementationVersion, ManifestFormat, Os, Requirements};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "depot")]
#[command(author, version, about = "depot - select, fetch and store verified implementations")]
pub struct Cli {
    /// Implementation store to use instead of the configured one
    #[arg(long, global = true, env = "DEPOT_STORE")]
    pub store: Option<PathBuf>,

    /// Feed directory to use instead of the configured one
    #[arg(long, global = true)]
    pub feeds: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Choose implementations for an interface and print them
    Select(SelectArgs),
    /// Choose implementations and fetch any that are not in the store
    Download(SelectArgs),
    /// Inspect and manage the implementation store
    Store {
        #[command(subcommand)]
        command: StoreCommands,
    },
}

/// Requirement flags shared by `select` and `download`.
#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Interface URI, or path to a local feed file
    pub interface: String,
    /// Only accept versions older than this
    #[arg(long)]
    pub before: Option<String>,
    /// Only accept this version or newer
    #[arg(long)]
    pub not_before: Option<String>,
    /// Target operating system (default: this machine's)
    #[arg(long)]
    pub os: Option<String>,
    /// Target processor (default: this machine's)
    #[arg(long, conflicts_with = "source")]
    pub cpu: Option<String>,
    /// Select source code instead of binaries
    #[arg(long)]
    pub source: bool,
    /// Require the root implementation to provide this command
    #[arg(long)]
    pub command: Option<String>,
    /// Print the selections document as JSON
    #[arg(long)]
    pub json: bool,
}

impl SelectArgs {
    pub fn requirements(&self) -> Result<Requirements> {
        let mut arch = Architecture::current();
        if let Some(os) = &self.os {
            arch.os = os.parse().with_context(|| format!("Invalid --os '{os}'"))?;
            if matches!(arch.os, Os::Other(_)) {
                bail!("Unknown --os '{os}'");
            }
        }
        if let Some(cpu) = &self.cpu {
            arch.cpu = cpu.parse().with_context(|| format!("Invalid --cpu '{cpu}'"))?;
            if matches!(arch.cpu, Cpu::Other(_)) {
                bail!("Unknown --cpu '{cpu}'");
            }
        }
        if self.source {
            arch.cpu = Cpu::Source;
        }

        let mut requirements = Requirements::new(self.interface.clone()).with_architecture(arch);
        if let Some(before) = &self.before {
            requirements = requirements.before(parse_version(before)?);
        }
        if let Some(not_before) = &self.not_before {
            requirements = requirements.not_before(parse_version(not_before)?);
        }
        if let Some(command) = &self.command {
            requirements = requirements.with_command(command.clone());
        }
        Ok(requirements)
    }
}

fn parse_version(text: &str) -> Result<ImplementationVersion> {
    text.parse()
        .with_context(|| format!("Invalid version '{text}'"))
}

#[derive(Debug, Subcommand)]
pub enum StoreCommands {
    /// List every implementation in the store
    List,
    /// Copy a directory into the store under the given digest
    Add {
        /// Expected digest, e.g. sha256new=...
        digest: String,
        /// Directory to copy
        dir: PathBuf,
    },
    /// Extract an archive into the store under the given digest
    AddArchive {
        /// Expected digest, e.g. sha256new=...
        digest: String,
        /// Archive file
        archive: PathBuf,
        /// MIME type (guessed from the file name if omitted)
        #[arg(long = "type")]
        mime_type: Option<String>,
        /// Only extract this sub-directory of the archive
        #[arg(long)]
        extract: Option<String>,
    },
    /// Delete implementations from the store
    Remove {
        #[arg(required = true)]
        digests: Vec<String>,
    },
    /// Check stored implementations against their digests
    Verify {
        #[arg(required = true)]
        digests: Vec<String>,
    },
    /// Verify every implementation in the store
    Audit,
    /// Print the directory holding an implementation
    Path { digest: String },
    /// Print the manifest of a directory
    Manifest {
        dir: PathBuf,
        #[arg(long, default_value = "sha256new")]
        algorithm: ManifestFormat,
    },
    /// Print the digest of a directory
    Digest {
        dir: PathBuf,
        /// Algorithms to compute (default: sha256new)
        #[arg(long = "algorithm")]
        algorithms: Vec<ManifestFormat>,
    },
    /// Remove temporary files left behind by interrupted operations
    Purge,
}
