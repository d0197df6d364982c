//! Dependency solving: [`Requirements`] in, [`Selections`] out.
//!
//! [`SatSolver`] resolves in-process with `PubGrub`. [`ProcessSolver`] asks an
//! external program. [`FallbackSolver`] chains two solvers, trying the second
//! only when the first reports a solving failure.

mod fallback;
mod process;
mod pubgrub_adapter;

use std::time::Duration;

use depot_schema::{Requirements, SchemaError, Selections};
use thiserror::Error;

use crate::feeds::FeedError;

pub use fallback::FallbackSolver;
pub use process::ProcessSolver;
pub use pubgrub_adapter::SatSolver;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("No implementations of {0} are available for this platform")]
    NoCandidates(String),

    #[error("Cannot satisfy the requirements for {interface}:\n{reason}")]
    Unsatisfiable { interface: String, reason: String },

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("External solver failed: {0}")]
    Process(String),

    #[error("External solver timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid selections document: {0}")]
    Schema(#[from] SchemaError),
}

impl SolverError {
    /// Whether this failure is about the solving itself, so that a
    /// different strategy might succeed. Broken feeds and malformed
    /// documents are not.
    pub fn is_fallback_eligible(&self) -> bool {
        !matches!(self, Self::Feed(_) | Self::Schema(_))
    }
}

/// Chooses one implementation per required interface.
///
/// Solving is synchronous and deterministic: the same feeds and
/// requirements always give the same selections.
pub trait Solver: Send + Sync {
    fn solve(&self, requirements: &Requirements) -> Result<Selections, SolverError>;
}

impl<T: Solver + ?Sized> Solver for Box<T> {
    fn solve(&self, requirements: &Requirements) -> Result<Selections, SolverError> {
        (**self).solve(requirements)
    }
}

impl<T: Solver + ?Sized> Solver for std::sync::Arc<T> {
    fn solve(&self, requirements: &Requirements) -> Result<Selections, SolverError> {
        (**self).solve(requirements)
    }
}
