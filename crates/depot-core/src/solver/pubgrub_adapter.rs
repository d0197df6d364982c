//! `PubGrub` adapter for implementation selection.
//!
//! Every interface reachable from the requirements becomes a `PubGrub`
//! package. Its compatible implementations are sorted by preference and
//! numbered so that the most preferred one carries the highest
//! [`NumberVersion`]; `PubGrub` always tries the highest version in range
//! first, so it explores candidates in exactly our preference order and
//! backtracks through them on conflicts.
//!
//! Preference, strongest rule first:
//! 1. exact OS/CPU match over family or wildcard matches,
//! 2. binaries over source when the target is not `src`,
//! 3. higher versions,
//! 4. implementations already in the store.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use depot_schema::{
    Architecture, Implementation, ImplementationSelection, ImplementationVersion,
    Requirements, Selections, VersionRange,
};
use pubgrub::error::PubGrubError;
use pubgrub::range::Range;
use pubgrub::report::{DefaultStringReporter, Reporter as _};
use pubgrub::solver::{OfflineDependencyProvider, resolve};
use pubgrub::version::NumberVersion;
use tracing::debug;

use super::{Solver, SolverError};
use crate::feeds::FeedProvider;
use crate::store::Store;

/// A `PubGrub` package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Root,
    Interface(String),
    /// Stands in for a dependency no implementation can satisfy.
    Missing(String),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Root => f.write_str("the requirements"),
            Node::Interface(uri) => f.write_str(uri),
            Node::Missing(uri) => write!(f, "{uri} (no compatible implementation)"),
        }
    }
}

/// In-process solver backed by `PubGrub`.
pub struct SatSolver {
    feeds: Arc<dyn FeedProvider>,
    store: Option<Store>,
}

impl SatSolver {
    pub fn new(feeds: Arc<dyn FeedProvider>) -> Self {
        Self { feeds, store: None }
    }

    /// Prefer implementations already present in `store`.
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    fn is_cached(&self, implementation: &Implementation) -> bool {
        self.store
            .as_ref()
            .is_some_and(|store| store.contains(&implementation.digest))
    }

    /// Compatible implementations of `interface`, most preferred first.
    fn candidates(
        &self,
        interface: &str,
        target: &Architecture,
        accept: impl Fn(&Implementation) -> bool,
    ) -> Result<Vec<Implementation>, SolverError> {
        let Some(feed) = self.feeds.get_feed(interface)? else {
            return Ok(Vec::new());
        };
        let mut candidates: Vec<Implementation> = feed
            .implementations
            .iter()
            .filter(|i| i.arch.is_compatible(target) && accept(i))
            .cloned()
            .collect();

        candidates.sort_by_cached_key(|i| {
            (
                Reverse(i.arch.match_rank(target)),
                !target.is_source() && i.arch.is_source(),
                Reverse(i.version.clone()),
                !self.is_cached(i),
                i.id.clone(),
            )
        });
        Ok(candidates)
    }
}

/// `PubGrub` version of the candidate at `index` in a list of `len`.
fn number(len: usize, index: usize) -> NumberVersion {
    NumberVersion((len - 1 - index) as u32)
}

/// Position in the candidate list of `version`.
fn index(len: usize, version: NumberVersion) -> usize {
    len - 1 - version.0 as usize
}

fn matching_range(candidates: &[Implementation], versions: &VersionRange) -> Range<NumberVersion> {
    let len = candidates.len();
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| versions.contains(&c.version))
        .fold(Range::none(), |range, (i, _)| {
            range.union(&Range::exact(number(len, i)))
        })
}

fn version_summary(candidates: &[Implementation]) -> String {
    let mut versions: Vec<&ImplementationVersion> = candidates.iter().map(|c| &c.version).collect();
    versions.sort();
    versions.dedup();
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Solver for SatSolver {
    fn solve(&self, requirements: &Requirements) -> Result<Selections, SolverError> {
        let root = requirements.interface.clone();
        let dependency_target = requirements.architecture.for_dependencies();

        let root_candidates = self.candidates(&root, &requirements.architecture, |i| {
            requirements.versions.contains(&i.version)
                && requirements
                    .command
                    .as_deref()
                    .is_none_or(|command| i.command(command).is_some())
        })?;
        if root_candidates.is_empty() {
            return Err(SolverError::NoCandidates(root));
        }

        // Discover every reachable interface.
        let mut graph: HashMap<String, Vec<Implementation>> = HashMap::new();
        let mut order = vec![root.clone()];
        let mut queue = VecDeque::new();
        for dep in root_candidates.iter().flat_map(|c| &c.dependencies) {
            queue.push_back(dep.interface.clone());
        }
        graph.insert(root.clone(), root_candidates);
        while let Some(interface) = queue.pop_front() {
            if graph.contains_key(&interface) {
                continue;
            }
            let candidates = self.candidates(&interface, &dependency_target, |_| true)?;
            for dep in candidates.iter().flat_map(|c| &c.dependencies) {
                if !graph.contains_key(&dep.interface) {
                    queue.push_back(dep.interface.clone());
                }
            }
            order.push(interface.clone());
            graph.insert(interface, candidates);
        }

        let mut provider = OfflineDependencyProvider::<Node, NumberVersion>::new();
        let root_candidates = &graph[&root];
        provider.add_dependencies(
            Node::Root,
            NumberVersion(0),
            [(
                Node::Interface(root.clone()),
                Range::between(NumberVersion(0), NumberVersion(root_candidates.len() as u32)),
            )],
        );
        for interface in &order {
            let candidates = &graph[interface];
            for (i, candidate) in candidates.iter().enumerate() {
                let deps: Vec<(Node, Range<NumberVersion>)> = candidate
                    .dependencies
                    .iter()
                    .map(|dep| {
                        let targets = graph.get(&dep.interface).map_or(&[][..], Vec::as_slice);
                        let range = matching_range(targets, &dep.versions);
                        if range == Range::none() {
                            (Node::Missing(dep.interface.clone()), Range::any())
                        } else {
                            (Node::Interface(dep.interface.clone()), range)
                        }
                    })
                    .collect();
                provider.add_dependencies(
                    Node::Interface(interface.clone()),
                    number(candidates.len(), i),
                    deps,
                );
            }
        }

        let solution = match resolve(&provider, Node::Root, NumberVersion(0)) {
            Ok(solution) => solution,
            Err(PubGrubError::NoSolution(mut tree)) => {
                tree.collapse_no_versions();
                let mut reason = DefaultStringReporter::report(&tree);
                let available = version_summary(&graph[&root]);
                reason.push_str(&format!("\nCompatible versions of {root}: {available}"));
                return Err(SolverError::Unsatisfiable {
                    interface: root,
                    reason,
                });
            }
            Err(e) => {
                return Err(SolverError::Unsatisfiable {
                    interface: root,
                    reason: e.to_string(),
                });
            }
        };

        // Root first, then dependencies breadth-first in declaration order.
        let mut implementations = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root.clone()]);
        while let Some(interface) = queue.pop_front() {
            if !seen.insert(interface.clone()) {
                continue;
            }
            let Some(version) = solution.get(&Node::Interface(interface.clone())) else {
                continue;
            };
            let candidates = &graph[&interface];
            let chosen = &candidates[index(candidates.len(), *version)];
            debug!("Selected {} {} ({})", interface, chosen.version, chosen.id);

            let command = if interface == root {
                requirements.command.clone()
            } else {
                None
            };
            implementations.push(ImplementationSelection::from_implementation(
                interface.clone(),
                chosen,
                command,
            ));
            for dep in &chosen.dependencies {
                queue.push_back(dep.interface.clone());
            }
        }

        Ok(Selections {
            interface: root,
            command: requirements.command.clone(),
            implementations,
        })
    }
}
