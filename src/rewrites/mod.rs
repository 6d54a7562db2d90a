//! Optimization passes.
//!
//! A [`Pass`] looks at one candidate node at a time and either declines or
//! returns a replacement node. Substituting the replacement for the candidate
//! is left to the caller (see [`crate::runner`]).

use crate::{ir::NodeId, ir::Program, manager::Manager};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

pub use all_reduce::AdjustAllReduceMulAdd;
pub use arithmetic::{simplify, simplify2, ArithmeticSimplify, ArithmeticSimplify2};

pub mod all_reduce;
pub mod arithmetic;

/// A rewrite applied to one node at a time.
pub trait Pass {
    /// The pass's name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// Returns a replacement for `node`, or [`None`] to leave it unchanged.
    ///
    /// New nodes may be added to `program`. Existing edges may only be changed
    /// through `manager`.
    fn apply(&self, program: &mut Program, manager: &mut Manager, node: NodeId) -> Option<NodeId>;
}

/// The passes this crate provides, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// [`ArithmeticSimplify`]
    ArithmeticSimplify,
    /// [`ArithmeticSimplify2`]
    ArithmeticSimplify2,
    /// [`AdjustAllReduceMulAdd`]
    AdjustAllReduceMulAdd,
}

impl PassKind {
    /// Every pass, in the order a full pipeline runs them.
    pub const ALL: [PassKind; 3] = [
        PassKind::ArithmeticSimplify,
        PassKind::ArithmeticSimplify2,
        PassKind::AdjustAllReduceMulAdd,
    ];

    /// The name used in configuration files and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ArithmeticSimplify => "arithmetic_simplify",
            Self::ArithmeticSimplify2 => "arithmetic_simplify2",
            Self::AdjustAllReduceMulAdd => "adjust_all_reduce_mul_add",
        }
    }

    /// Instantiates the pass.
    #[must_use]
    pub fn pass(self) -> Box<dyn Pass> {
        match self {
            Self::ArithmeticSimplify => Box::new(ArithmeticSimplify),
            Self::ArithmeticSimplify2 => Box::new(ArithmeticSimplify2),
            Self::AdjustAllReduceMulAdd => Box::new(AdjustAllReduceMulAdd),
        }
    }
}

/// An error returned for an unknown pass name.
#[derive(Debug, Clone, Error)]
#[error("unknown pass `{0}`")]
pub struct ParsePassError(String);

impl FromStr for PassKind {
    type Err = ParsePassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ParsePassError(s.to_owned()))
    }
}

impl Display for PassKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
