//! Moving an `AllReduce` past a scale-and-add.
//!
//! ```text
//! AddN(MakeTuple(Mul(AllReduce(x), y), z))  =>  Mul(AllReduce(AddN(MakeTuple(z, x))), y)
//! ```
//!
//! With `z` a weight-decay term, the sum happens before the reduction, which
//! saves one collective. The tuple's two elements may come in either order.

use super::Pass;
use crate::{
    ir::{GraphId, NodeId, Primitive, Program},
    manager::Manager,
};
use log::debug;

/// Which part of the subgraph the matcher is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    /// An element of the `AddN`'s tuple.
    Element,
    /// The first operand of a `Mul` element.
    Reduced,
}

impl Default for Level {
    fn default() -> Self {
        Self::Element
    }
}

/// The state of one match attempt.
#[derive(Debug, Default)]
struct Matcher {
    level: Level,
    x: Option<NodeId>,
    y: Option<NodeId>,
    z: Option<NodeId>,
    all_reduce_op: Option<NodeId>,
    all_reduce_graph: Option<GraphId>,
    mul_op: Option<NodeId>,
    mul_call: Option<NodeId>,
}

impl Matcher {
    fn visit(&mut self, program: &Program, node: NodeId) -> bool {
        match self.level {
            Level::Element => {
                if !self.visit_mul(program, node) {
                    self.z = Some(node);
                }
                true
            }
            Level::Reduced => self.visit_all_reduce(program, node),
        }
    }

    /// Binds `Mul(AllReduce(x), y)`.
    fn visit_mul(&mut self, program: &Program, node: NodeId) -> bool {
        let operands = match program.operands(node) {
            Some(operands) if operands.len() == 3 && program.is_call_to(node, Primitive::Mul) => {
                operands
            }
            _ => return false,
        };
        self.level = Level::Reduced;
        let reduced = self.visit(program, operands[1]);
        self.level = Level::Element;
        if reduced {
            self.mul_op = Some(operands[0]);
            self.mul_call = Some(node);
            self.y = Some(operands[2]);
        }
        reduced
    }

    fn visit_all_reduce(&mut self, program: &Program, node: NodeId) -> bool {
        match program.operands(node) {
            Some(operands) if operands.len() > 1 && program.is_call_to(node, Primitive::AllReduce) => {
                self.all_reduce_op = Some(operands[0]);
                self.x = Some(operands[1]);
                self.all_reduce_graph = program.sub_graph_of(node);
                true
            }
            _ => false,
        }
    }
}

/// A complete match.
#[derive(Debug)]
struct Found {
    x: NodeId,
    y: NodeId,
    z: NodeId,
    graph: GraphId,
    tuple: NodeId,
    tuple_op: NodeId,
    add_op: NodeId,
    all_reduce_op: NodeId,
    mul_op: NodeId,
    mul_call: NodeId,
}

fn find(program: &Program, node: NodeId) -> Option<Found> {
    let add = match program.operands(node) {
        Some(add) if add.len() == 2 && program.is_call_to(node, Primitive::AddN) => add,
        _ => return None,
    };
    let tuple = add[1];
    let elements = match program.operands(tuple) {
        Some(elements) if elements.len() == 3 && program.is_call_to(tuple, Primitive::MakeTuple) => {
            elements
        }
        _ => return None,
    };

    let mut matcher = Matcher::default();
    for &element in &elements[1..] {
        matcher.visit(program, element);
    }
    match matcher {
        Matcher {
            x: Some(x),
            y: Some(y),
            z: Some(z),
            all_reduce_op: Some(all_reduce_op),
            all_reduce_graph: Some(graph),
            mul_op: Some(mul_op),
            mul_call: Some(mul_call),
            ..
        } => Some(Found {
            x,
            y,
            z,
            graph,
            tuple,
            tuple_op: elements[0],
            add_op: add[0],
            all_reduce_op,
            mul_op,
            mul_call,
        }),
        _ => None,
    }
}

/// Rewrites `AddN(MakeTuple(Mul(AllReduce(x), y), z))` into
/// `Mul(AllReduce(AddN(MakeTuple(z, x))), y)`.
///
/// The new calls are built in the sub-graph owning the `AllReduce` and reuse
/// the original operator nodes. A `z` call owned by another sub-graph is
/// rebuilt there first. Other `MakeTuple`s consuming the original `Mul` are
/// re-pointed at the new `AllReduce`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjustAllReduceMulAdd;

impl Pass for AdjustAllReduceMulAdd {
    fn name(&self) -> &'static str {
        "adjust_all_reduce_mul_add"
    }

    fn apply(&self, program: &mut Program, manager: &mut Manager, node: NodeId) -> Option<NodeId> {
        let found = find(program, node)?;
        let graph = found.graph;

        let z = match program.operands(found.z) {
            Some(operands) if program.sub_graph_of(found.z) != Some(graph) => {
                let operands = operands.to_vec();
                let ty = program.type_of(found.z).cloned();
                let rehomed = program.new_call(operands, graph);
                if let Some(ty) = ty {
                    program.set_type(rehomed, ty);
                }
                debug!("rebuilt {} in {}", found.z, program.graph(graph).name());
                rehomed
            }
            _ => found.z,
        };

        let tuple = program.new_call([found.tuple_op, z, found.x], graph);
        let add = program.new_call([found.add_op, tuple], graph);
        let all_reduce = program.new_call([found.all_reduce_op, add], graph);
        let mul = program.new_call([found.mul_op, all_reduce, found.y], graph);

        for (user, pos) in manager.users_of(found.mul_call) {
            if user != found.tuple && program.is_call_to(user, Primitive::MakeTuple) {
                debug!("re-pointing {}#{} at {}", user, pos, all_reduce);
                manager.set_edge(program, user, pos, all_reduce);
            }
        }
        Some(mul)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn output(p: &Program, graph: &str) -> NodeId {
        let g = p.graph_by_name(graph).unwrap();
        p.operands(p.graph(g).output().unwrap()).unwrap()[1]
    }

    fn rewrite(text: &str) -> (Program, Option<NodeId>) {
        let mut p: Program = text.parse().unwrap();
        let mut manager = Manager::new(&p);
        let root = output(&p, "main");
        let result = AdjustAllReduceMulAdd.apply(&mut p, &mut manager, root);
        (p, result)
    }

    #[test]
    fn test_reassociate() {
        let mut p: Program = "
            (graph main (g w d)
              (let m (Mul (AllReduce g) w))
              (return (AddN (MakeTuple m d))))"
            .parse()
            .unwrap();
        let mut manager = Manager::new(&p);
        let root = output(&p, "main");
        let tuple = p.operands(root).unwrap()[1];
        let m = p.operands(tuple).unwrap()[1];
        let all_reduce = p.operands(m).unwrap()[1];

        let result = AdjustAllReduceMulAdd.apply(&mut p, &mut manager, root).unwrap();
        assert_eq!(p.expr(result).to_string(), "(Mul (AllReduce (AddN (MakeTuple d g))) w)");
        assert_eq!(p.sub_graph_of(result), p.graph_by_name("main"));

        let new_all_reduce = p.operands(result).unwrap()[1];
        let new_add = p.operands(new_all_reduce).unwrap()[1];
        let new_tuple = p.operands(new_add).unwrap()[1];
        assert_eq!(p.operands(result).unwrap()[0], p.operands(m).unwrap()[0]);
        assert_eq!(p.operands(new_all_reduce).unwrap()[0], p.operands(all_reduce).unwrap()[0]);
        assert_eq!(p.operands(new_add).unwrap()[0], p.operands(root).unwrap()[0]);
        assert_eq!(p.operands(new_tuple).unwrap()[0], p.operands(tuple).unwrap()[0]);
    }

    #[test]
    fn test_either_element_order() {
        let (p, result) = rewrite(
            "(graph main (g w d) (return (AddN (MakeTuple d (Mul (AllReduce g) w)))))",
        );
        assert_eq!(
            p.expr(result.unwrap()).to_string(),
            "(Mul (AllReduce (AddN (MakeTuple d g))) w)"
        );
    }

    #[test]
    fn test_dependency_repair() {
        let mut p: Program = "
            (graph main (g w d)
              (let m (Mul (AllReduce g) w))
              (let s (AddN (MakeTuple m d)))
              (return (MakeTuple s (MakeTuple m) (Depend m s))))"
            .parse()
            .unwrap();
        let mut manager = Manager::new(&p);
        let outer = output(&p, "main");
        let outer_ops = p.operands(outer).unwrap().to_vec();
        let (s, wrapper, depend) = (outer_ops[1], outer_ops[2], outer_ops[3]);
        let tuple = p.operands(s).unwrap()[1];
        let m = p.operands(tuple).unwrap()[1];
        let mut users = manager.users_of(m);
        users.sort();
        let mut expected = vec![(tuple, 1), (wrapper, 1), (depend, 1)];
        expected.sort();
        assert_eq!(users, expected);

        let result = AdjustAllReduceMulAdd.apply(&mut p, &mut manager, s).unwrap();
        let new_all_reduce = p.operands(result).unwrap()[1];
        assert_eq!(p.operands(wrapper).unwrap()[1], new_all_reduce);
        assert_eq!(manager.users_of(new_all_reduce), vec![(wrapper, 1)]);
        let users = manager.users_of(m);
        assert_eq!(users.len(), 2);
        assert!(users.contains(&(tuple, 1)) && users.contains(&(depend, 1)));
        assert_eq!(p.operands(depend).unwrap()[1], m);
    }

    #[test]
    fn test_rehome_z() {
        let (p, result) = rewrite(
            "
            (graph outer (d) (let z (Add d 1)) (return (@main d d)))
            (graph main (g w) (return (AddN (MakeTuple (Mul (AllReduce g) w) z))))",
        );
        let main = p.graph_by_name("main").unwrap();
        let outer = p.graph_by_name("outer").unwrap();
        let result = result.unwrap();
        assert_eq!(p.expr(result).to_string(), "(Mul (AllReduce (AddN (MakeTuple (Add d 1) g))) w)");

        let all_reduce = p.operands(result).unwrap()[1];
        let add = p.operands(all_reduce).unwrap()[1];
        let tuple = p.operands(add).unwrap()[1];
        let z = p.operands(tuple).unwrap()[1];
        assert_eq!(p.sub_graph_of(z), Some(main));

        let original = p.operands(p.operands(output(&p, "main")).unwrap()[1]).unwrap()[2];
        assert_ne!(z, original);
        assert_eq!(p.sub_graph_of(original), Some(outer));
        assert_eq!(p.operands(z), p.operands(original));
    }

    #[test]
    fn test_foreign_parameter_is_kept() {
        let (p, result) = rewrite(
            "
            (graph outer (d) (return (@main d d)))
            (graph main (g w) (return (AddN (MakeTuple (Mul (AllReduce g) w) d))))",
        );
        let d = p.graph(p.graph_by_name("outer").unwrap()).params()[0];
        let all_reduce = p.operands(result.unwrap()).unwrap()[1];
        let add = p.operands(all_reduce).unwrap()[1];
        let tuple = p.operands(add).unwrap()[1];
        assert_eq!(p.operands(tuple).unwrap()[1], d);
    }

    #[test]
    fn test_no_rewrite() {
        for text in &[
            // Three elements.
            "(graph main (g w d) (return (AddN (MakeTuple (Mul (AllReduce g) w) d d))))",
            // Not an AllReduce.
            "(graph main (g w d) (return (AddN (MakeTuple (Mul (Identity g) w) d))))",
            // Only the first Mul operand is inspected, so a reduction in the
            // second position is left alone.
            "(graph main (g w d) (return (AddN (MakeTuple (Mul w (AllReduce g)) d))))",
            // AllReduce without an operand.
            "(graph main (w d) (return (AddN (MakeTuple (Mul (AllReduce) w) d))))",
            // Both elements reduced.
            "(graph main (g w) (return (AddN (MakeTuple (Mul (AllReduce g) w) (Mul (AllReduce w) g)))))",
            // Two AddN operands.
            "(graph main (g w d) (return (AddN (MakeTuple (Mul (AllReduce g) w) d) d)))",
            "(graph main (g w d) (return (Add (MakeTuple (Mul (AllReduce g) w) d))))",
        ] {
            let before: Program = text.parse().unwrap();
            let (after, result) = rewrite(text);
            assert_eq!(result, None, "{}", text);
            assert_eq!(after.len(), before.len());
            let root = output(&after, "main");
            assert_eq!(after.expr(root).to_string(), before.expr(root).to_string());
        }
    }

    #[test]
    fn test_fresh_state_per_candidate() {
        let mut p: Program = "
            (graph main (g w d)
              (let m (Mul (AllReduce g) w))
              (return (MakeTuple (AddN (MakeTuple m d)) (AddN (MakeTuple w d)))))"
            .parse()
            .unwrap();
        let mut manager = Manager::new(&p);
        let outer = p.operands(output(&p, "main")).unwrap().to_vec();
        assert!(AdjustAllReduceMulAdd.apply(&mut p, &mut manager, outer[1]).is_some());
        assert_eq!(AdjustAllReduceMulAdd.apply(&mut p, &mut manager, outer[2]), None);
    }
}
