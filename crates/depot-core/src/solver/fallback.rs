use depot_schema::{Requirements, Selections};
use tracing::info;

use super::{Solver, SolverError};

/// Runs `primary`, and `secondary` only if `primary` fails to solve.
///
/// Errors that are not solving failures (see
/// [`SolverError::is_fallback_eligible`]) are returned from `primary`
/// without consulting `secondary`.
#[derive(Debug, Clone)]
pub struct FallbackSolver<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Solver, B: Solver> FallbackSolver<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: Solver, B: Solver> Solver for FallbackSolver<A, B> {
    fn solve(&self, requirements: &Requirements) -> Result<Selections, SolverError> {
        match self.primary.solve(requirements) {
            Err(e) if e.is_fallback_eligible() => {
                info!("Primary solver failed ({}); trying fallback", e);
                self.secondary.solve(requirements)
            }
            other => other,
        }
    }
}
