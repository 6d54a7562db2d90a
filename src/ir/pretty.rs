//! Textual views of a [`Program`].

use super::{GraphId, NodeId, NodeKind, Program, Value};
use itertools::Itertools;
use std::fmt::{self, Display, Formatter};

/// Displays a node as an inline s-expression. Shared operands are repeated.
#[derive(Debug, Clone, Copy)]
pub struct Expr<'a> {
    program: &'a Program,
    node: NodeId,
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let p = self.program;
        match p[self.node].kind() {
            NodeKind::Parameter(name) => f.write_str(name.as_str()),
            NodeKind::Value(value) => fmt_value(p, value, f),
            NodeKind::Call(operands) => {
                f.write_str("(")?;
                for (i, &operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    p.expr(operand).fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

fn fmt_value(p: &Program, value: &Value, f: &mut Formatter<'_>) -> fmt::Result {
    match value {
        Value::Literal(lit) => lit.fmt(f),
        Value::Primitive(prim) => prim.fmt(f),
        Value::Graph(g) => write!(f, "@{}", p.graph(*g).name()),
    }
}

/// Displays a sub-graph as a list of SSA assignments.
#[derive(Debug, Clone, Copy)]
pub struct GraphListing<'a> {
    program: &'a Program,
    graph: GraphId,
}

impl GraphListing<'_> {
    fn operand(&self, node: NodeId) -> String {
        let p = self.program;
        match p[node].kind() {
            NodeKind::Call(_) => format!("%{}", node),
            _ => p.expr(node).to_string(),
        }
    }
}

impl Display for GraphListing<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let p = self.program;
        let graph = p.graph(self.graph);
        writeln!(
            f,
            "graph {}({}) {{",
            graph.name(),
            graph.params().iter().map(|&x| p.expr(x)).join(", ")
        )?;
        let output = match graph.output() {
            Some(output) => output,
            None => return f.write_str("}"),
        };
        for node in p.post_order(output) {
            let operands = match p.operands(node) {
                Some(operands) => operands,
                None => continue,
            };
            if node == output {
                writeln!(f, "  return {}", operands.iter().skip(1).map(|&x| self.operand(x)).join(", "))?;
                continue;
            }
            write!(
                f,
                "  %{} = {}({})",
                node,
                operands.first().map_or_else(String::new, |&op| self.operand(op)),
                operands.iter().skip(1).map(|&x| self.operand(x)).join(", ")
            )?;
            if let Some(ty) = p.type_of(node) {
                write!(f, " : {}", ty)?;
            }
            writeln!(f)?;
        }
        f.write_str("}")
    }
}

impl Program {
    /// An inline s-expression view of `node`.
    #[must_use]
    pub fn expr(&self, node: NodeId) -> Expr<'_> {
        Expr {
            program: self,
            node,
        }
    }

    /// An SSA listing of `graph`.
    #[must_use]
    pub fn display_graph(&self, graph: GraphId) -> GraphListing<'_> {
        GraphListing {
            program: self,
            graph,
        }
    }
}
