//! Running passes over a program until nothing changes.

use crate::{
    ir::{NodeId, Program},
    manager::Manager,
    rewrites::{Pass, PassKind},
};
use hashbrown::HashSet;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug, Formatter},
    fs, io,
    path::Path,
};
use thiserror::Error;

/// Settings for a [`Runner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// The maximum number of iterations.
    pub iter_limit: usize,
    /// The passes making up one iteration, in order.
    pub passes: Vec<PassKind>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iter_limit: 100,
            passes: PassKind::ALL.to_vec(),
        }
    }
}

/// An error while loading a [`RunnerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    /// The file is not a valid configuration.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not describe a configuration.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// An iteration changed nothing.
    Saturated,
    /// The iteration limit was reached.
    IterationLimit(usize),
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// The number of iterations run.
    pub iterations: usize,
    /// The number of substitutions made by each pass.
    pub rewrites: IndexMap<&'static str, usize>,
    /// Why the run ended.
    pub stop_reason: StopReason,
}

impl Report {
    /// The number of substitutions made by all passes.
    #[must_use]
    pub fn total_rewrites(&self) -> usize {
        self.rewrites.values().sum()
    }
}

/// Applies a sequence of passes to a program until it stops changing.
///
/// One iteration runs every pass as a separate sweep. A sweep offers each live
/// node to the pass once, operands before their users, and substitutes any
/// replacement for the node everywhere it is used. Nodes a sweep builds are
/// first offered in the next iteration.
pub struct Runner {
    iter_limit: usize,
    passes: Vec<Box<dyn Pass>>,
}

impl Runner {
    /// Creates a runner from its configuration.
    #[must_use]
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            iter_limit: config.iter_limit,
            passes: config.passes.iter().map(|kind| kind.pass()).collect(),
        }
    }

    /// Rewrites `program` in place.
    pub fn run(&self, program: &mut Program) -> Report {
        let mut manager = Manager::new(program);
        let mut rewrites: IndexMap<&'static str, usize> =
            self.passes.iter().map(|pass| (pass.name(), 0)).collect();

        for iteration in 1..=self.iter_limit {
            let mut changed = 0;
            for pass in &self.passes {
                let count = sweep(pass.as_ref(), program, &mut manager);
                *rewrites.entry(pass.name()).or_default() += count;
                changed += count;
            }
            info!("iteration {}: {} rewrites", iteration, changed);
            if changed == 0 {
                return Report {
                    iterations: iteration,
                    rewrites,
                    stop_reason: StopReason::Saturated,
                };
            }
        }
        Report {
            iterations: self.iter_limit,
            rewrites,
            stop_reason: StopReason::IterationLimit(self.iter_limit),
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(&RunnerConfig::default())
    }
}

impl Debug for Runner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("iter_limit", &self.iter_limit)
            .field(
                "passes",
                &self.passes.iter().map(|pass| pass.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// The live nodes of every sub-graph, each after its operands.
fn schedule(program: &Program) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    program
        .graphs()
        .filter_map(|(_, graph)| graph.output())
        .flat_map(|output| program.post_order(output))
        .filter(|&node| seen.insert(node))
        .collect()
}

fn sweep(pass: &dyn Pass, program: &mut Program, manager: &mut Manager) -> usize {
    let mut count = 0;
    for node in schedule(program) {
        if !manager.is_tracked(node) {
            continue;
        }
        if let Some(new) = pass.apply(program, manager, node) {
            if manager.replace(program, node, new) {
                debug!("{}: {} => {}", pass.name(), node, new);
                count += 1;
            }
        }
    }
    count
}
