//! The computation-graph intermediate representation.
//!
//! A [`Program`] is an arena of [`Node`]s grouped into named [`SubGraph`]s.
//! Nodes are addressed by [`NodeId`]. A call's first operand is its operator,
//! either a primitive value or a sub-graph value. Operand counts are not
//! checked when a call is built; matchers check arity themselves.

use egg::{Id, Symbol};
use hashbrown::HashSet;
use smallvec::SmallVec;

pub use literal::{fold, DType, FoldOp, Literal, Scalar, Shape, Tensor, TensorType};
pub use pretty::{Expr, GraphListing};
pub use primitive::Primitive;

pub mod literal;
mod pretty;
mod primitive;

/// Identifies a node in a [`Program`].
pub type NodeId = Id;

/// Operand lists of calls.
pub type Operands = SmallVec<[NodeId; 4]>;

/// Identifies a sub-graph in a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(usize);

impl GraphId {
    /// The index of this sub-graph in its program.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The constant held by a value node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// An embedded literal.
    Literal(Literal),
    /// A reference to a primitive operator.
    Primitive(Primitive),
    /// A reference to a sub-graph.
    Graph(GraphId),
}

/// The three kinds of node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An operator applied to operands. The operator is operand zero.
    Call(Operands),
    /// A constant.
    Value(Value),
    /// A free variable bound by its sub-graph.
    Parameter(Symbol),
}

/// A node and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    kind: NodeKind,
    graph: Option<GraphId>,
    ty: Option<TensorType>,
}

impl Node {
    /// What kind of node this is.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The owning sub-graph, if the node is attached to one.
    #[must_use]
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// The abstract type annotation, if any.
    #[must_use]
    pub fn ty(&self) -> Option<&TensorType> {
        self.ty.as_ref()
    }
}

/// A named unit of nodes, with parameters and an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGraph {
    name: Symbol,
    params: Vec<NodeId>,
    output: Option<NodeId>,
}

impl SubGraph {
    /// The sub-graph's name.
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// The parameter nodes, in order.
    #[must_use]
    pub fn params(&self) -> &[NodeId] {
        &self.params
    }

    /// The `Return` call producing the sub-graph's result.
    #[must_use]
    pub fn output(&self) -> Option<NodeId> {
        self.output
    }
}

/// An arena of nodes and sub-graphs.
#[derive(Debug, Clone, Default)]
pub struct Program {
    nodes: Vec<Node>,
    graphs: Vec<SubGraph>,
}

impl std::ops::Index<NodeId> for Program {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[usize::from(id)]
    }
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of nodes ever allocated, live or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over the sub-graphs with their ids.
    pub fn graphs(&self) -> impl Iterator<Item = (GraphId, &SubGraph)> {
        self.graphs
            .iter()
            .enumerate()
            .map(|(i, graph)| (GraphId(i), graph))
    }

    /// Returns the sub-graph with the given id.
    #[must_use]
    pub fn graph(&self, id: GraphId) -> &SubGraph {
        &self.graphs[id.0]
    }

    /// Looks a sub-graph up by name.
    #[must_use]
    pub fn graph_by_name(&self, name: &str) -> Option<GraphId> {
        self.graphs().find(|(_, g)| g.name.as_str() == name).map(|(id, _)| id)
    }

    /// Adds an empty sub-graph.
    pub fn add_graph(&mut self, name: &str) -> GraphId {
        self.graphs.push(SubGraph {
            name: Symbol::from(name),
            params: Vec::new(),
            output: None,
        });
        GraphId(self.graphs.len() - 1)
    }

    fn push(&mut self, kind: NodeKind, graph: Option<GraphId>) -> NodeId {
        self.nodes.push(Node {
            kind,
            graph,
            ty: None,
        });
        NodeId::from(self.nodes.len() - 1)
    }

    /// Appends a parameter to `graph`.
    pub fn new_parameter(&mut self, name: &str, graph: GraphId) -> NodeId {
        let id = self.push(NodeKind::Parameter(Symbol::from(name)), Some(graph));
        self.graphs[graph.0].params.push(id);
        id
    }

    /// Creates a value node owned by `graph`, or detached.
    pub fn new_value(&mut self, value: Value, graph: Option<GraphId>) -> NodeId {
        self.push(NodeKind::Value(value), graph)
    }

    /// Shorthand for a literal value node.
    pub fn new_literal(&mut self, literal: Literal, graph: Option<GraphId>) -> NodeId {
        self.new_value(Value::Literal(literal), graph)
    }

    /// Shorthand for a primitive value node.
    pub fn new_primitive(&mut self, prim: Primitive, graph: Option<GraphId>) -> NodeId {
        self.new_value(Value::Primitive(prim), graph)
    }

    /// Creates a call owned by `graph`.
    pub fn new_call<I>(&mut self, operands: I, graph: GraphId) -> NodeId
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.push(NodeKind::Call(operands.into_iter().collect()), Some(graph))
    }

    /// Creates a call that no sub-graph owns yet.
    pub fn new_detached_call<I>(&mut self, operands: I) -> NodeId
    where
        I: IntoIterator<Item = NodeId>,
    {
        self.push(NodeKind::Call(operands.into_iter().collect()), None)
    }

    /// Sets the output of `graph` to `Return(result)` and returns the new
    /// `Return` call.
    pub fn set_output(&mut self, graph: GraphId, result: NodeId) -> NodeId {
        let op = self.new_primitive(Primitive::Return, Some(graph));
        let ret = self.new_call([op, result], graph);
        self.graphs[graph.0].output = Some(ret);
        ret
    }

    /// The sub-graph owning `node`, if any.
    #[must_use]
    pub fn sub_graph_of(&self, node: NodeId) -> Option<GraphId> {
        self[node].graph
    }

    /// The value held by `node`, if it is a value node.
    #[must_use]
    pub fn value_of(&self, node: NodeId) -> Option<&Value> {
        match &self[node].kind {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The literal held by `node`, if it is a literal value node.
    #[must_use]
    pub fn literal_of(&self, node: NodeId) -> Option<&Literal> {
        match &self[node].kind {
            NodeKind::Value(Value::Literal(lit)) => Some(lit),
            _ => None,
        }
    }

    /// The primitive referenced by `node`, if it is a primitive value node.
    #[must_use]
    pub fn primitive_of(&self, node: NodeId) -> Option<Primitive> {
        match &self[node].kind {
            NodeKind::Value(Value::Primitive(prim)) => Some(*prim),
            _ => None,
        }
    }

    /// Returns `true` if `node` is a value node.
    #[must_use]
    pub fn is_value(&self, node: NodeId) -> bool {
        self.value_of(node).is_some()
    }

    /// The operands of a call, operator first.
    #[must_use]
    pub fn operands(&self, node: NodeId) -> Option<&[NodeId]> {
        match &self[node].kind {
            NodeKind::Call(operands) => Some(operands),
            _ => None,
        }
    }

    /// The primitive a call applies, if its operator is a primitive value.
    #[must_use]
    pub fn call_primitive(&self, node: NodeId) -> Option<Primitive> {
        self.operands(node)
            .and_then(|operands| operands.first())
            .and_then(|&op| self.primitive_of(op))
    }

    /// Returns `true` if `node` is a call to `prim`.
    #[must_use]
    pub fn is_call_to(&self, node: NodeId, prim: Primitive) -> bool {
        self.call_primitive(node) == Some(prim)
    }

    /// Replaces operand `pos` of the call `node`. Returns the previous operand,
    /// or [`None`] if `node` is not a call or has no such operand.
    pub fn set_operand(&mut self, node: NodeId, pos: usize, new: NodeId) -> Option<NodeId> {
        match &mut self.nodes[usize::from(node)].kind {
            NodeKind::Call(operands) => operands
                .get_mut(pos)
                .map(|slot| std::mem::replace(slot, new)),
            _ => None,
        }
    }

    /// The abstract type annotation of `node`.
    #[must_use]
    pub fn type_of(&self, node: NodeId) -> Option<&TensorType> {
        self[node].ty.as_ref()
    }

    /// Annotates `node` with an abstract type.
    pub fn set_type(&mut self, node: NodeId, ty: TensorType) {
        self.nodes[usize::from(node)].ty = Some(ty);
    }

    /// Returns the nodes reachable from `root` through operands, each after
    /// all of its operands.
    #[must_use]
    pub fn post_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.push((node, true));
            if let Some(operands) = self.operands(node) {
                for &operand in operands.iter().rev() {
                    if !seen.contains(&operand) {
                        stack.push((operand, false));
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_and_query() {
        let mut p = Program::new();
        let g = p.add_graph("main");
        let x = p.new_parameter("x", g);
        let two = p.new_literal(Literal::int(2), Some(g));
        let mul = p.new_primitive(Primitive::Mul, Some(g));
        let call = p.new_call([mul, x, two], g);
        let ret = p.set_output(g, call);

        assert_eq!(p.graph(g).params(), &[x]);
        assert_eq!(p.graph(g).output(), Some(ret));
        assert_eq!(p.graph_by_name("main"), Some(g));
        assert!(p.is_call_to(call, Primitive::Mul));
        assert!(p.is_call_to(ret, Primitive::Return));
        assert_eq!(p.literal_of(two), Some(&Literal::int(2)));
        assert_eq!(p.literal_of(x), None);
        assert_eq!(p.sub_graph_of(call), Some(g));
        assert_eq!(p.post_order(ret).last(), Some(&ret));
        assert!(p.post_order(ret).contains(&two));
    }

    #[test]
    fn test_detached_call() {
        let mut p = Program::new();
        let id = p.new_primitive(Primitive::Identity, None);
        let lit = p.new_literal(Literal::int(1), None);
        let call = p.new_detached_call([id, lit]);
        assert_eq!(p.sub_graph_of(call), None);
        assert_eq!(p.set_operand(call, 1, id), Some(lit));
        assert_eq!(p.set_operand(call, 5, id), None);
        assert_eq!(p.set_operand(lit, 0, id), None);
    }
}
