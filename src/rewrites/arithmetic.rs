//! Arithmetic identities.
//!
//! Two sweeps. [`simplify`] removes additive and multiplicative identities,
//! folds nested constant multiplications and drops `Identity`, `Pow(x, 1)` and
//! zero-gradient `Momentum` updates. [`simplify2`] collapses multiplications by
//! zero; it runs as its own sweep so it never interleaves with the constant
//! folding of the first.

use super::Pass;
use crate::{
    ir::{fold, FoldOp, Literal, NodeId, Primitive, Program},
    manager::Manager,
    pattern::{Bindings, Pattern, Var},
    rule::{apply_rules, Replacement, Rule},
};
use lazy_static::lazy_static;
use log::debug;
use peephole_macros::rules;

lazy_static! {
    /// Sweep-one rules that may run on detached nodes.
    pub static ref SIMPLIFY: &'static [Rule] = {
        let x = Var::new("x");
        let c1 = Var::new("c1");
        let c2 = Var::new("c2");
        let zero = Var::new("zero");
        let rules = rules! {
            // `zero()` accepts scalar and tensor zeros alike.
            add_zero: Pattern::var(x) + Pattern::zero() => x;
            add_zero_left: Pattern::zero() + Pattern::var(x) => x;
            scalar_add_zero: scalar_add(Pattern::var(x), Pattern::zero().scalar()) => x;
            scalar_add_zero_left: scalar_add(Pattern::zero().scalar(), Pattern::var(x)) => x;

            mul_one: Pattern::var(x) * Pattern::one() => copy_value(x) if bound_to_value(x);
            scalar_mul_one: scalar_mul(Pattern::var(x), Pattern::one().scalar()) => x;
            scalar_mul_one_left: scalar_mul(Pattern::one().scalar(), Pattern::var(x)) => x;

            scalar_mul_zero: scalar_mul(Pattern::var(x), Pattern::zero().scalar().named(zero))
                => fresh_zero(zero);
            scalar_mul_zero_left: scalar_mul(Pattern::zero().scalar().named(zero), Pattern::var(x))
                => fresh_zero(zero);

            identity: Pattern::call(Primitive::Identity, vec![Pattern::var(x)]) => x;

            constant_duplicate_mul: Pattern::constant().named(c1)
                * (Pattern::constant().named(c2) * Pattern::var(x))
                => fold_constants(c1, c2, x);
        };
        rules.leak()
    };

    /// Sweep-one rules that build calls, tried only on attached nodes.
    pub static ref SIMPLIFY_ATTACHED: &'static [Rule] = {
        let x = Var::new("x");
        let y = Var::new("y");
        let z = Var::new("z");
        let xs = Var::new("xs");
        let rules = rules! {
            opt_update_zero_tensor: Pattern::call(
                Primitive::Momentum,
                vec![
                    Pattern::call(Primitive::ZerosLike, vec![Pattern::var(x)]),
                    Pattern::var(y),
                    Pattern::var(z),
                ],
            )
            .with_rest(xs)
                => make_tuple(z, y);

            power_one: Pattern::call(Primitive::Pow, vec![Pattern::var(x), Pattern::one().scalar()])
                => x;
        };
        rules.leak()
    };

    /// Sweep-two rules.
    pub static ref SIMPLIFY2: &'static [Rule] = {
        let x = Var::new("x");
        let y = Var::new("y");
        let zero = Var::new("zero");
        let rules = rules! {
            mul_zero: Pattern::var(x) * Pattern::zero().named(zero) => zero;
            mul_zeros_like: Pattern::var(x) * Pattern::call(Primitive::ZerosLike, vec![Pattern::var(y)])
                => fresh_zero(y);
        };
        rules.leak()
    };
}

fn scalar_add(a: Pattern, b: Pattern) -> Pattern {
    Pattern::call(Primitive::ScalarAdd, vec![a, b])
}

fn scalar_mul(a: Pattern, b: Pattern) -> Pattern {
    Pattern::call(Primitive::ScalarMul, vec![a, b])
}

fn bound_to_value(var: Var) -> impl Fn(&Program, &Bindings, NodeId) -> bool + Send + Sync {
    move |program, bindings, _| bindings.get(var).map_or(false, |node| program.is_value(node))
}

/// A new value node holding the value bound to `var`, typed like the
/// candidate where it has a type.
fn copy_value(var: Var) -> Replacement {
    Replacement::build(move |program, bindings, node| {
        let source = bindings.get(var)?;
        let value = program.value_of(source)?.clone();
        let ty = program
            .type_of(node)
            .or_else(|| program.type_of(source))
            .cloned();
        let copy = program.new_value(value, program.sub_graph_of(node));
        if let Some(ty) = ty {
            program.set_type(copy, ty);
        }
        Some(copy)
    })
}

/// A zero literal shaped like the candidate. An untyped candidate takes the
/// type of the node bound to `like`, then falls back to a scalar integer zero.
fn fresh_zero(like: Var) -> Replacement {
    Replacement::build(move |program, bindings, node| {
        let source = bindings.get(like)?;
        let ty = program
            .type_of(node)
            .or_else(|| program.type_of(source))
            .cloned()
            .or_else(|| program.literal_of(source).map(Literal::ty));
        let literal = match &ty {
            Some(ty) => Literal::filled(ty, 0)?,
            None => Literal::int(0),
        };
        let zero = program.new_literal(literal, program.sub_graph_of(node));
        if let Some(ty) = ty {
            program.set_type(zero, ty);
        }
        Some(zero)
    })
}

/// `c1 * (c2 * x)` to `x * c` where `c = c1 * c2` folds, otherwise to
/// `x * (c1 * c2)`. Both calls reuse the candidate's operator node.
fn fold_constants(c1: Var, c2: Var, x: Var) -> Replacement {
    Replacement::build(move |program, bindings, node| {
        let graph = program.sub_graph_of(node)?;
        let mul = *program.operands(node)?.first()?;
        let (c1, c2, x) = (bindings.get(c1)?, bindings.get(c2)?, bindings.get(x)?);

        let folded = match (program.literal_of(c1), program.literal_of(c2)) {
            (Some(a), Some(b)) => fold(a, b, FoldOp::Mul),
            _ => None,
        };
        let constant = match folded {
            Some(literal) => program.new_literal(literal, Some(graph)),
            None => {
                debug!("cannot fold {} * {}", program.expr(c1), program.expr(c2));
                program.new_call([mul, c1, c2], graph)
            }
        };
        Some(program.new_call([mul, x, constant], graph))
    })
}

fn make_tuple(first: Var, second: Var) -> Replacement {
    Replacement::build(move |program, bindings, node| {
        let graph = program.sub_graph_of(node)?;
        let (first, second) = (bindings.get(first)?, bindings.get(second)?);
        let op = program.new_primitive(Primitive::MakeTuple, Some(graph));
        Some(program.new_call([op, first, second], graph))
    })
}

/// Applies the first sweep to `node`.
pub fn simplify(program: &mut Program, node: NodeId) -> Option<NodeId> {
    apply_rules(*SIMPLIFY, program, node).or_else(|| {
        program.sub_graph_of(node)?;
        apply_rules(*SIMPLIFY_ATTACHED, program, node)
    })
}

/// Applies the second sweep to `node`.
pub fn simplify2(program: &mut Program, node: NodeId) -> Option<NodeId> {
    apply_rules(*SIMPLIFY2, program, node)
}

/// The first arithmetic sweep as a [`Pass`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticSimplify;

impl Pass for ArithmeticSimplify {
    fn name(&self) -> &'static str {
        "arithmetic_simplify"
    }

    fn apply(&self, program: &mut Program, _: &mut Manager, node: NodeId) -> Option<NodeId> {
        simplify(program, node)
    }
}

/// The second arithmetic sweep as a [`Pass`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticSimplify2;

impl Pass for ArithmeticSimplify2 {
    fn name(&self) -> &'static str {
        "arithmetic_simplify2"
    }

    fn apply(&self, program: &mut Program, _: &mut Manager, node: NodeId) -> Option<NodeId> {
        simplify2(program, node)
    }
}
