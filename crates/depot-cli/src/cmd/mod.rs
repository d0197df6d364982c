//! Subcommand implementations.

pub mod download;
pub mod select;
pub mod store;

use anyhow::{Context as _, Result};
use depot_core::feeds::FeedCache;
use depot_core::solver::{FallbackSolver, ProcessSolver, SatSolver};
use depot_core::{Config, Solver, Store};
use depot_schema::{Requirements, Selections};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::Cli;

/// Settings and handles shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    pub config: Config,
}

impl Context {
    /// Load the configuration, then apply command-line overrides.
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = Config::load().context("Failed to load configuration")?;
        if let Some(store) = &cli.store {
            config.store.clone_from(store);
        }
        if let Some(feeds) = &cli.feeds {
            config.feeds.clone_from(feeds);
        }
        debug!("Using store {} and feeds {}", config.store.display(), config.feeds.display());
        Ok(Self { config })
    }

    pub fn store(&self) -> Result<Store> {
        Store::open(&self.config.store)
            .with_context(|| format!("Failed to open store at {}", self.config.store.display()))
    }

    /// Built-in solver, backed by the configured external solver if any.
    pub fn solver(&self, store: &Store) -> Box<dyn Solver> {
        let feeds = Arc::new(FeedCache::new(&self.config.feeds));
        let sat = SatSolver::new(feeds).with_store(store.clone());
        match self
            .config
            .solver_command
            .as_deref()
            .and_then(ProcessSolver::from_command_line)
        {
            Some(external) => {
                let timeout = Duration::from_secs(self.config.solver_timeout_secs);
                Box::new(FallbackSolver::new(sat, external.with_timeout(timeout)))
            }
            None => Box::new(sat),
        }
    }
}

/// Run `solver` on the blocking pool. An external solver can wait on its
/// child process for the whole configured timeout.
pub async fn solve_blocking(solver: Box<dyn Solver>, requirements: Requirements) -> Result<Selections> {
    let selections = tokio::task::spawn_blocking(move || solver.solve(&requirements))
        .await
        .context("Solver task failed")??;
    Ok(selections)
}
