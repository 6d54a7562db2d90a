#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    anonymous_parameters,
    elided_lifetimes_in_paths,
    missing_copy_implementations,
    missing_debug_implementations,
    single_use_lifetimes,
    trivial_casts,
    unreachable_pub,
    unused_lifetimes,
)]

//! peephole: a term-rewriting engine for a computation-graph IR.
//!
//! Passes are offered one node at a time and return a replacement or nothing.
//! [`rewrites::ArithmeticSimplify`] and [`rewrites::ArithmeticSimplify2`] apply
//! ordered [`rule::Rule`] lists built from [`pattern::Pattern`]s;
//! [`rewrites::AdjustAllReduceMulAdd`] moves an `AllReduce` past a
//! scale-and-add. [`runner::Runner`] drives passes to a fixpoint.

extern crate self as peephole;

pub mod ir;
pub mod manager;
pub mod pattern;
pub mod rewrites;
pub mod rule;
pub mod runner;
pub mod sexp;
pub mod text;

pub use ir::{NodeId, Program};
pub use manager::Manager;
pub use pattern::{Bindings, Pattern, Var};
pub use peephole_macros::rules;
pub use rewrites::{Pass, PassKind};
pub use rule::{Replacement, Rule};
pub use runner::{Report, Runner, RunnerConfig, StopReason};
pub use text::ParseProgramError;
