//! Ordered rule lists and their application to a single candidate node.
//!
//! A [`Rule`] pairs a [`Pattern`] with a [`Replacement`] and an optional
//! condition. [`apply_rules`] tries rules in order and returns the first
//! replacement produced; later rules are not considered.

use crate::{
    ir::{NodeId, Program},
    pattern::{Bindings, Pattern, Var},
};
use log::trace;
use std::fmt::{self, Debug, Formatter};

/// Builds a replacement from the bindings of a match and the candidate node.
pub type Builder = dyn Fn(&mut Program, &Bindings, NodeId) -> Option<NodeId> + Send + Sync;

/// A further check on a match.
pub type Condition = dyn Fn(&Program, &Bindings, NodeId) -> bool + Send + Sync;

/// What a matching rule produces.
pub enum Replacement {
    /// The node bound to a variable, returned as is.
    Bound(Var),
    /// A new node. The builder may decline by returning [`None`].
    Build(Box<Builder>),
}

impl Replacement {
    /// A replacement computed by `builder`.
    pub fn build<F>(builder: F) -> Self
    where
        F: Fn(&mut Program, &Bindings, NodeId) -> Option<NodeId> + Send + Sync + 'static,
    {
        Self::Build(Box::new(builder))
    }
}

impl From<Var> for Replacement {
    fn from(var: Var) -> Self {
        Self::Bound(var)
    }
}

impl Debug for Replacement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound(var) => write!(f, "Bound({})", var),
            Self::Build(_) => f.write_str("Build(..)"),
        }
    }
}

/// A named rewrite rule.
pub struct Rule {
    name: &'static str,
    searcher: Pattern,
    applier: Replacement,
    condition: Option<Box<Condition>>,
}

impl Rule {
    /// Creates an unconditional rule.
    pub fn new<R: Into<Replacement>>(name: &'static str, searcher: Pattern, applier: R) -> Self {
        Self {
            name,
            searcher,
            applier: applier.into(),
            condition: None,
        }
    }

    /// Adds a condition that must hold on the bindings for the rule to fire.
    #[must_use]
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Program, &Bindings, NodeId) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Box::new(condition));
        self
    }

    /// The rule's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The pattern the rule looks for.
    #[must_use]
    pub fn searcher(&self) -> &Pattern {
        &self.searcher
    }

    /// Tries this rule on `node`. Each call starts from empty bindings.
    pub fn apply(&self, program: &mut Program, node: NodeId) -> Option<NodeId> {
        let bindings = self.searcher.matches(program, node)?;
        if let Some(condition) = &self.condition {
            if !condition(program, &bindings, node) {
                return None;
            }
        }
        let result = match &self.applier {
            Replacement::Bound(var) => bindings.get(*var),
            Replacement::Build(builder) => builder(program, &bindings, node),
        };
        if let Some(result) = result {
            trace!("{}: {} => {}", self.name, node, result);
        }
        result
    }
}

impl Debug for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("searcher", &self.searcher().to_string())
            .field("applier", &self.applier)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// Applies the first rule of `rules` that produces a replacement for `node`.
pub fn apply_rules(rules: &[Rule], program: &mut Program, node: NodeId) -> Option<NodeId> {
    rules.iter().find_map(|rule| rule.apply(program, node))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Literal, Primitive};
    use peephole_macros::rules;

    fn root(p: &Program) -> NodeId {
        let g = p.graph_by_name("main").unwrap();
        p.operands(p.graph(g).output().unwrap()).unwrap()[1]
    }

    fn neg_one(p: &mut Program, _: &Bindings, node: NodeId) -> Option<NodeId> {
        Some(p.new_literal(Literal::int(-1), p.sub_graph_of(node)))
    }

    #[test]
    fn test_first_match_wins() {
        let x = Var::new("x");
        let rules = rules! {
            never: Pattern::var(x) * Pattern::var(x) => x;
            first: Pattern::var(x) + Pattern::zero() => x;
            second: Pattern::var(x) + Pattern::var(Var::new("y")) => Replacement::build(neg_one);
        };
        let mut p: Program = "(graph main (a) (return (Add a 0)))".parse().unwrap();
        let node = root(&p);
        let a = p.graph(p.graph_by_name("main").unwrap()).params()[0];
        let before = p.len();

        assert_eq!(apply_rules(&rules, &mut p, node), Some(a));
        assert_eq!(p.len(), before);
        assert_eq!(rules[1].name(), "first");
        assert_eq!(rules[1].searcher().to_string(), "(Add ?x 0)");
        assert!(format!("{:?}", rules[1]).contains("(Add ?x 0)"));
    }

    #[test]
    fn test_conditions_and_builders() {
        let x = Var::new("x");
        let rules = rules! {
            guarded: Pattern::var(x) + Pattern::zero() => x
                if move |p: &Program, b: &Bindings, _: NodeId| b.get(x).map_or(false, |n| p.is_value(n));
            fallback: Pattern::call(Primitive::Add, vec![Pattern::var(x), Pattern::constant()])
                => Replacement::build(neg_one);
        };
        let mut p: Program = "(graph main (a) (return (Add a 0)))".parse().unwrap();
        let node = root(&p);

        let result = apply_rules(&rules, &mut p, node).unwrap();
        assert_eq!(p.expr(result).to_string(), "-1");
        assert_eq!(p.sub_graph_of(result), p.graph_by_name("main"));
    }

    #[test]
    fn test_no_match() {
        let x = Var::new("x");
        let rules = rules! {
            add_zero: Pattern::var(x) + Pattern::zero() => x;
        };
        let mut p: Program = "(graph main (a) (return (Mul a 0)))".parse().unwrap();
        let node = root(&p);
        assert_eq!(apply_rules(&rules, &mut p, node), None);
        assert_eq!(apply_rules(&[], &mut p, node), None);
    }
}
