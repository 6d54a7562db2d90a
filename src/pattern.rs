//! Structural patterns over IR nodes.
//!
//! A [`Pattern`] describes the shape of a small subgraph rooted at one node:
//! wildcards, constants (optionally a specific value, scalar-only, or
//! satisfying a predicate) and calls to named primitives whose operands are
//! themselves patterns. Matching is a pure test that fills a [`Bindings`]
//! table; it never looks further than the pattern's own nesting.
//!
//! `a + b` and `a * b` build [`Primitive::Add`] and [`Primitive::Mul`] calls.
//! They are not commutative: write both orders when the constant may appear on
//! either side.

use crate::ir::{Literal, NodeId, Operands, Primitive, Program};
use egg::Symbol;
use smallvec::SmallVec;
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, Mul},
    sync::Arc,
};

/// A pattern variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(Symbol);

impl Var {
    /// Creates the variable `?name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Symbol::from(name))
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// A test on the literal held by a constant.
pub type Predicate = Arc<dyn Fn(&Literal) -> bool + Send + Sync>;

/// Matches literal value nodes.
#[derive(Clone, Default)]
pub struct ConstPattern {
    var: Option<Var>,
    value: Option<i64>,
    scalar_only: bool,
    predicate: Option<Predicate>,
}

impl ConstPattern {
    fn accepts(&self, literal: &Literal) -> bool {
        (!self.scalar_only || literal.is_scalar())
            && self.value.map_or(true, |v| literal.is_uniformly(v))
            && self.predicate.as_ref().map_or(true, |p| p(literal))
    }
}

impl Debug for ConstPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstPattern")
            .field("var", &self.var)
            .field("value", &self.value)
            .field("scalar_only", &self.scalar_only)
            .field("predicate", &self.predicate.as_ref().map(|_| ".."))
            .finish()
    }
}

/// A structural pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches any node and binds it.
    Wildcard(Var),
    /// Matches a literal value node.
    Const(ConstPattern),
    /// Matches a call to `op` whose operands match `args` in order. With
    /// `rest`, any further operands are accepted and bound as a list;
    /// without it the operand count must be exact.
    Call {
        /// The primitive the call must apply.
        op: Primitive,
        /// Patterns for the leading operands.
        args: Vec<Pattern>,
        /// Binds the trailing operands, if any are allowed.
        rest: Option<Var>,
    },
}

impl Pattern {
    /// A wildcard bound to `var`.
    #[must_use]
    pub fn var(var: Var) -> Self {
        Self::Wildcard(var)
    }

    /// Any literal.
    #[must_use]
    pub fn constant() -> Self {
        Self::Const(ConstPattern::default())
    }

    /// A literal uniformly equal to zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::value(0)
    }

    /// A literal uniformly equal to one.
    #[must_use]
    pub fn one() -> Self {
        Self::value(1)
    }

    /// A scalar literal equal to `value`, or a tensor filled with it.
    #[must_use]
    pub fn value(value: i64) -> Self {
        Self::Const(ConstPattern {
            value: Some(value),
            ..ConstPattern::default()
        })
    }

    /// A call to `op` with exactly the given operands.
    #[must_use]
    pub fn call<I>(op: Primitive, args: I) -> Self
    where
        I: IntoIterator<Item = Pattern>,
    {
        Self::Call {
            op,
            args: args.into_iter().collect(),
            rest: None,
        }
    }

    /// Binds a constant pattern's node to `var`.
    ///
    /// Only constant patterns are affected.
    #[must_use]
    pub fn named(self, var: Var) -> Self {
        self.map_const(|c| c.var = Some(var))
    }

    /// Restricts a constant pattern to scalar literals.
    ///
    /// Only constant patterns are affected.
    #[must_use]
    pub fn scalar(self) -> Self {
        self.map_const(|c| c.scalar_only = true)
    }

    /// Restricts a constant pattern to literals satisfying `predicate`.
    ///
    /// Only constant patterns are affected.
    #[must_use]
    pub fn satisfying<F>(self, predicate: F) -> Self
    where
        F: Fn(&Literal) -> bool + Send + Sync + 'static,
    {
        self.map_const(|c| c.predicate = Some(Arc::new(predicate)))
    }

    /// Lets a call pattern accept extra trailing operands, bound to `var`.
    ///
    /// Only call patterns are affected.
    #[must_use]
    pub fn with_rest(mut self, var: Var) -> Self {
        if let Self::Call { rest, .. } = &mut self {
            *rest = Some(var);
        }
        self
    }

    fn map_const<F: FnOnce(&mut ConstPattern)>(mut self, f: F) -> Self {
        if let Self::Const(c) = &mut self {
            f(c);
        }
        self
    }

    /// Matches `node` against this pattern, returning the bindings on success.
    #[must_use]
    pub fn matches(&self, program: &Program, node: NodeId) -> Option<Bindings> {
        let mut bindings = Bindings::default();
        if self.try_match(program, node, &mut bindings) {
            Some(bindings)
        } else {
            None
        }
    }

    /// Matches `node` against this pattern, adding to `bindings`.
    ///
    /// A variable already bound must be bound to the same node again. On
    /// failure `bindings` is left as it was.
    pub fn try_match(&self, program: &Program, node: NodeId, bindings: &mut Bindings) -> bool {
        let mark = bindings.mark();
        let matched = self.match_node(program, node, bindings);
        if !matched {
            bindings.rollback(mark);
        }
        matched
    }

    fn match_node(&self, program: &Program, node: NodeId, bindings: &mut Bindings) -> bool {
        match self {
            Self::Wildcard(var) => bindings.bind(*var, node),
            Self::Const(c) => {
                program.literal_of(node).map_or(false, |lit| c.accepts(lit))
                    && c.var.map_or(true, |var| bindings.bind(var, node))
            }
            Self::Call { op, args, rest } => {
                let operands = match program.operands(node) {
                    Some(operands) if !operands.is_empty() => operands,
                    _ => return false,
                };
                if program.primitive_of(operands[0]) != Some(*op) {
                    return false;
                }
                let actual = &operands[1..];
                let arity_ok = match rest {
                    Some(_) => actual.len() >= args.len(),
                    None => actual.len() == args.len(),
                };
                arity_ok
                    && args
                        .iter()
                        .zip(actual)
                        .all(|(pat, &operand)| pat.match_node(program, operand, bindings))
                    && rest.map_or(true, |var| bindings.bind_rest(var, &actual[args.len()..]))
            }
        }
    }
}

impl Add for Pattern {
    type Output = Pattern;

    fn add(self, rhs: Pattern) -> Pattern {
        Pattern::call(Primitive::Add, vec![self, rhs])
    }
}

impl Mul for Pattern {
    type Output = Pattern;

    fn mul(self, rhs: Pattern) -> Pattern {
        Pattern::call(Primitive::Mul, vec![self, rhs])
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard(var) => Display::fmt(var, f),
            Self::Const(c) => {
                match (c.var, c.value) {
                    (_, Some(value)) => write!(f, "{}", value)?,
                    (Some(var), None) => write!(f, "{}", var)?,
                    (None, None) => f.write_str("_")?,
                }
                if c.scalar_only {
                    f.write_str(":scalar")?;
                }
                Ok(())
            }
            Self::Call { op, args, rest } => {
                write!(f, "({}", op)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                if let Some(rest) = rest {
                    write!(f, " {}...", rest)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// The nodes bound by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    nodes: SmallVec<[(Var, NodeId); 4]>,
    rests: SmallVec<[(Var, Operands); 1]>,
}

impl Bindings {
    /// The node bound to `var`.
    #[must_use]
    pub fn get(&self, var: Var) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(v, _)| *v == var)
            .map(|&(_, node)| node)
    }

    /// The operands bound to the rest variable `var`.
    #[must_use]
    pub fn rest(&self, var: Var) -> Option<&[NodeId]> {
        self.rests
            .iter()
            .find(|(v, _)| *v == var)
            .map(|(_, nodes)| nodes.as_slice())
    }

    /// The literal held by the node bound to `var`.
    #[must_use]
    pub fn literal<'p>(&self, program: &'p Program, var: Var) -> Option<&'p Literal> {
        self.get(var).and_then(|node| program.literal_of(node))
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.rests.is_empty()
    }

    fn bind(&mut self, var: Var, node: NodeId) -> bool {
        match self.get(var) {
            Some(bound) => bound == node,
            None => {
                self.nodes.push((var, node));
                true
            }
        }
    }

    fn bind_rest(&mut self, var: Var, nodes: &[NodeId]) -> bool {
        match self.rest(var) {
            Some(bound) => bound == nodes,
            None => {
                self.rests.push((var, nodes.iter().copied().collect()));
                true
            }
        }
    }

    fn mark(&self) -> (usize, usize) {
        (self.nodes.len(), self.rests.len())
    }

    fn rollback(&mut self, (nodes, rests): (usize, usize)) {
        self.nodes.truncate(nodes);
        self.rests.truncate(rests);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn program(text: &str) -> (Program, NodeId) {
        let p: Program = text.parse().unwrap();
        let g = p.graph_by_name("main").unwrap();
        let ret = p.graph(g).output().unwrap();
        let root = p.operands(ret).unwrap()[1];
        (p, root)
    }

    #[test]
    fn test_wildcards() {
        let x = Var::new("x");
        let y = Var::new("y");
        let (p, root) = program("(graph main (a b) (return (Mul a b)))");
        let params = p.graph(p.graph_by_name("main").unwrap()).params().to_vec();

        let b = (Pattern::var(x) * Pattern::var(y)).matches(&p, root).unwrap();
        assert_eq!(b.get(x), Some(params[0]));
        assert_eq!(b.get(y), Some(params[1]));

        // A variable used twice must bind the same node twice.
        assert!((Pattern::var(x) * Pattern::var(x)).matches(&p, root).is_none());
        assert!((Pattern::var(x) + Pattern::var(y)).matches(&p, root).is_none());
    }

    #[test]
    fn test_constants() {
        let c = Var::new("c");
        let (p, root) = program(
            "(graph main (a) (return (MakeTuple 0 (tensor int (2) 1 1) 1.0 a)))",
        );
        let elems = p.operands(root).unwrap()[1..].to_vec();

        assert!(Pattern::zero().matches(&p, elems[0]).is_some());
        assert!(Pattern::zero().scalar().matches(&p, elems[0]).is_some());
        assert!(Pattern::one().matches(&p, elems[1]).is_some());
        assert!(Pattern::one().scalar().matches(&p, elems[1]).is_none());
        assert!(Pattern::one().matches(&p, elems[2]).is_some());
        assert!(Pattern::constant().matches(&p, elems[3]).is_none());

        let b = Pattern::constant().named(c).matches(&p, elems[1]).unwrap();
        assert_eq!(b.literal(&p, c).map(Literal::is_scalar), Some(false));

        let scalars = Pattern::constant().satisfying(Literal::is_scalar);
        assert!(scalars.matches(&p, elems[2]).is_some());
        assert!(scalars.matches(&p, elems[1]).is_none());
    }

    #[test]
    fn test_arity_and_rest() {
        let x = Var::new("x");
        let xs = Var::new("xs");
        let (p, root) = program("(graph main (a b c) (return (Momentum a b c)))");

        let exact = Pattern::call(Primitive::Momentum, vec![Pattern::var(x)]);
        assert!(exact.matches(&p, root).is_none());

        let b = exact.with_rest(xs).matches(&p, root).unwrap();
        assert_eq!(b.rest(xs).map(<[_]>::len), Some(2));

        let too_many = Pattern::call(
            Primitive::Momentum,
            vec![Pattern::var(x), Pattern::var(x), Pattern::var(x), Pattern::var(x)],
        )
        .with_rest(xs);
        assert!(too_many.matches(&p, root).is_none());
    }

    #[test]
    fn test_failure_leaves_bindings() {
        let x = Var::new("x");
        let y = Var::new("y");
        let (p, root) = program("(graph main (a) (return (Mul a 2)))");
        let mut bindings = Bindings::default();

        let fails = Pattern::var(x) * Pattern::one().named(y);
        assert!(!fails.try_match(&p, root, &mut bindings));
        assert!(bindings.is_empty());

        assert!(Pattern::var(y).try_match(&p, root, &mut bindings));
        assert!(!(Pattern::var(x) * Pattern::var(y)).try_match(&p, root, &mut bindings));
        assert_eq!(bindings.get(x), None);
        assert_eq!(bindings.get(y), Some(root));
    }

    #[test]
    fn test_display() {
        let x = Var::new("x");
        let pat = Pattern::call(Primitive::Momentum, vec![Pattern::var(x), Pattern::zero().scalar()])
            .with_rest(Var::new("xs"));
        assert_eq!(pat.to_string(), "(Momentum ?x 0:scalar ?xs...)");
        assert_eq!(Pattern::var(x).to_string(), "?x");
    }
}
