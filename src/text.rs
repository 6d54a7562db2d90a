//! Reading programs from their s-expression form.
//!
//! ```text
//! ; comments run to the end of the line
//! (graph main (g w d)
//!   (let m (Mul (AllReduce g) w))
//!   (return (AddN (MakeTuple m d))))
//! ```
//!
//! A file is a sequence of `(graph NAME (PARAMS...) FORMS...)`. Each graph
//! holds `(let NAME EXPR)` forms and exactly one `(return EXPR)`. Names are
//! global to the file, so a graph may use a node another graph owns.
//!
//! Expressions are integers, floats, `true`/`false`, bound names, `@graph`
//! references, `(tensor DTYPE (DIMS...) ELEMS...)` literals,
//! `(typed DTYPE (DIMS...) EXPR)` annotations and calls `(OP ARGS...)`.

use crate::{
    ir::{DType, GraphId, Literal, NodeId, Primitive, Program, Scalar, Tensor, TensorType, Value},
    sexp::{ParseSexpError, Sexp},
};
use hashbrown::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// An error while reading a program.
#[derive(Debug, Clone, Error)]
pub enum ParseProgramError {
    /// The text is not a sequence of s-expressions.
    #[error(transparent)]
    Sexp(#[from] ParseSexpError),

    /// A form does not have the expected shape.
    #[error("expected {expected}, found `{found}`")]
    Malformed {
        /// What was expected.
        expected: &'static str,
        /// The offending form.
        found: String,
    },

    /// A name was used but never bound.
    #[error("unbound name `{0}`")]
    Unbound(String),

    /// A name was bound twice.
    #[error("`{0}` is already defined")]
    Duplicate(String),

    /// A tensor literal whose elements do not fit its type or shape.
    #[error("invalid literal `{0}`")]
    BadLiteral(String),

    /// A graph without a `return` form.
    #[error("graph `{0}` has no return")]
    MissingReturn(String),
}

fn malformed(expected: &'static str, found: &Sexp<'_>) -> ParseProgramError {
    ParseProgramError::Malformed {
        expected,
        found: found.to_string(),
    }
}

struct Reader<'a> {
    program: Program,
    graphs: HashMap<&'a str, GraphId>,
    names: HashMap<&'a str, NodeId>,
}

impl<'a> Reader<'a> {
    fn declare_graph(&mut self, form: &Sexp<'a>) -> Result<(), ParseProgramError> {
        match form.as_form() {
            Some(("graph", [Sexp::Atom(name), Sexp::List(_), ..])) => {
                if self.graphs.contains_key(name) {
                    return Err(ParseProgramError::Duplicate((*name).to_owned()));
                }
                let id = self.program.add_graph(name);
                self.graphs.insert(*name, id);
                Ok(())
            }
            _ => Err(malformed("(graph NAME (PARAMS...) FORMS...)", form)),
        }
    }

    fn define_graph(&mut self, form: &Sexp<'a>) -> Result<(), ParseProgramError> {
        let (name, params, body) = match form.as_form() {
            Some(("graph", [Sexp::Atom(name), Sexp::List(params), body @ ..])) => {
                (*name, params, body)
            }
            _ => return Err(malformed("(graph NAME (PARAMS...) FORMS...)", form)),
        };
        let graph = self.graphs[name];

        for param in params {
            match param {
                Sexp::Atom(param) => {
                    let id = self.program.new_parameter(param, graph);
                    self.bind(*param, id)?;
                }
                Sexp::List(_) => return Err(malformed("a parameter name", param)),
            }
        }

        let mut returned = false;
        for item in body {
            match item.as_form() {
                Some(("let", [Sexp::Atom(var), expr])) => {
                    let id = self.expr(expr, graph)?;
                    self.bind(*var, id)?;
                }
                Some(("return", [expr])) if !returned => {
                    let id = self.expr(expr, graph)?;
                    self.program.set_output(graph, id);
                    returned = true;
                }
                _ => return Err(malformed("(let NAME EXPR) or a single (return EXPR)", item)),
            }
        }
        if returned {
            Ok(())
        } else {
            Err(ParseProgramError::MissingReturn(name.to_owned()))
        }
    }

    fn bind(&mut self, name: &'a str, id: NodeId) -> Result<(), ParseProgramError> {
        if self.names.insert(name, id).is_some() {
            return Err(ParseProgramError::Duplicate(name.to_owned()));
        }
        Ok(())
    }

    fn expr(&mut self, sexp: &Sexp<'a>, graph: GraphId) -> Result<NodeId, ParseProgramError> {
        match sexp {
            Sexp::Atom(atom) => self.atom(*atom, graph),
            Sexp::List(items) => match sexp.as_form() {
                Some(("tensor", [Sexp::Atom(dtype), Sexp::List(dims), elems @ ..])) => {
                    let ty = tensor_type(dtype, dims, sexp)?;
                    let data = elems
                        .iter()
                        .map(|elem| match elem {
                            Sexp::Atom(atom) => scalar(atom, ty.dtype),
                            Sexp::List(_) => None,
                        })
                        .collect::<Option<Vec<_>>>()
                        .and_then(|data| Tensor::new(ty.dtype, ty.shape.iter().copied(), data))
                        .ok_or_else(|| ParseProgramError::BadLiteral(sexp.to_string()))?;
                    Ok(self
                        .program
                        .new_literal(Literal::Tensor(data), Some(graph)))
                }
                Some(("typed", [Sexp::Atom(dtype), Sexp::List(dims), expr])) => {
                    let ty = tensor_type(dtype, dims, sexp)?;
                    let id = self.expr(expr, graph)?;
                    self.program.set_type(id, ty);
                    Ok(id)
                }
                _ => {
                    let (head, args) = match items.split_first() {
                        Some(split) => split,
                        None => return Err(malformed("a call", sexp)),
                    };
                    let op = self.expr(head, graph)?;
                    let mut operands = vec![op];
                    for arg in args {
                        operands.push(self.expr(arg, graph)?);
                    }
                    Ok(self.program.new_call(operands, graph))
                }
            },
        }
    }

    fn atom(&mut self, atom: &'a str, graph: GraphId) -> Result<NodeId, ParseProgramError> {
        if let Some(&id) = self.names.get(atom) {
            return Ok(id);
        }
        if let Some(name) = atom.strip_prefix('@') {
            let target = *self
                .graphs
                .get(name)
                .ok_or_else(|| ParseProgramError::Unbound(atom.to_owned()))?;
            return Ok(self.program.new_value(Value::Graph(target), Some(graph)));
        }
        if let Some(lit) = literal(atom) {
            return Ok(self.program.new_literal(lit, Some(graph)));
        }
        let prim = match atom.parse::<Primitive>() {
            Ok(prim) => prim,
            Err(never) => match never {},
        };
        if matches!(prim, Primitive::Other(_)) && !is_primitive_name(atom) {
            return Err(ParseProgramError::Unbound(atom.to_owned()));
        }
        Ok(self.program.new_primitive(prim, Some(graph)))
    }
}

/// Primitive names start with an upper-case letter; anything else must be
/// bound.
fn is_primitive_name(atom: &str) -> bool {
    atom.chars().next().map_or(false, char::is_uppercase)
}

fn literal(atom: &str) -> Option<Literal> {
    match atom {
        "true" => return Some(Literal::Scalar(Scalar::Bool(true))),
        "false" => return Some(Literal::Scalar(Scalar::Bool(false))),
        _ => {}
    }
    if let Ok(i) = atom.parse::<i64>() {
        return Some(Literal::int(i));
    }
    if atom.contains(|c| c == '.' || c == 'e' || c == 'E') {
        if let Ok(x) = atom.parse::<f64>() {
            return Literal::float(x);
        }
    }
    None
}

fn scalar(atom: &str, dtype: DType) -> Option<Scalar> {
    match (literal(atom)?, dtype) {
        (Literal::Scalar(Scalar::Int(i)), DType::Float) => Some(Scalar::of(DType::Float, i)),
        (Literal::Scalar(x), _) if x.dtype() == dtype => Some(x),
        _ => None,
    }
}

fn tensor_type(dtype: &str, dims: &[Sexp<'_>], form: &Sexp<'_>) -> Result<TensorType, ParseProgramError> {
    let dtype = DType::from_str(dtype).map_err(|_| malformed("a dtype (bool, int or float)", form))?;
    let shape = dims
        .iter()
        .map(|dim| match dim {
            Sexp::Atom(dim) => dim.parse::<usize>().ok(),
            Sexp::List(_) => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| malformed("a list of dimensions", form))?;
    Ok(TensorType::new(dtype, shape))
}

impl FromStr for Program {
    type Err = ParseProgramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let forms = Sexp::parse_many(s)?;
        let mut reader = Reader {
            program: Program::new(),
            graphs: HashMap::new(),
            names: HashMap::new(),
        };
        for form in &forms {
            reader.declare_graph(form)?;
        }
        for form in &forms {
            reader.define_graph(form)?;
        }
        Ok(reader.program)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn output(p: &Program, graph: &str) -> String {
        let g = p.graph_by_name(graph).unwrap();
        p.expr(p.graph(g).output().unwrap()).to_string()
    }

    #[test]
    fn test_read_graph() {
        let p: Program = "
            ; weight decay
            (graph main (g w d)
              (let m (Mul (AllReduce g) w))
              (return (AddN (MakeTuple m d))))"
            .parse()
            .unwrap();
        assert_eq!(output(&p, "main"), "(Return (AddN (MakeTuple (Mul (AllReduce g) w) d)))");
        assert_eq!(p.graph(p.graph_by_name("main").unwrap()).params().len(), 3);
    }

    #[test]
    fn test_literals() {
        let p: Program = "(graph f () (return (MakeTuple 1 -2.5 true (tensor float (2) 1 2.0))))"
            .parse()
            .unwrap();
        assert_eq!(
            output(&p, "f"),
            "(Return (MakeTuple 1 -2.5 true (tensor float (2) 1.0 2.0)))"
        );
    }

    #[test]
    fn test_types_and_graph_refs() {
        let p: Program = "
            (graph g (a) (return a))
            (graph f (x) (let y (typed float (2 3) (@g x))) (return y))"
            .parse()
            .unwrap();
        assert_eq!(output(&p, "f"), "(Return (@g x))");
        let f = p.graph_by_name("f").unwrap();
        let ret = p.graph(f).output().unwrap();
        let call = p.operands(ret).unwrap()[1];
        assert_eq!(p.type_of(call), Some(&TensorType::new(DType::Float, [2, 3])));
    }

    #[test]
    fn test_cross_graph_names() {
        let p: Program = "
            (graph outer (a) (let z (Add a 1)) (return (@inner a)))
            (graph inner (b) (return (Mul b z)))"
            .parse()
            .unwrap();
        let outer = p.graph_by_name("outer").unwrap();
        let inner = p.graph_by_name("inner").unwrap();
        let ret = p.graph(inner).output().unwrap();
        let mul = p.operands(ret).unwrap()[1];
        let z = p.operands(mul).unwrap()[2];
        assert_eq!(p.sub_graph_of(mul), Some(inner));
        assert_eq!(p.sub_graph_of(z), Some(outer));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            "(graph f (x) (return y))".parse::<Program>(),
            Err(ParseProgramError::Unbound(_))
        ));
        assert!(matches!(
            "(graph f (x) (let x 1) (return x))".parse::<Program>(),
            Err(ParseProgramError::Duplicate(_))
        ));
        assert!(matches!(
            "(graph f (x))".parse::<Program>(),
            Err(ParseProgramError::MissingReturn(_))
        ));
        assert!(matches!(
            "(graph f () (return (tensor int (3) 1 2)))".parse::<Program>(),
            Err(ParseProgramError::BadLiteral(_))
        ));
        assert!(matches!(
            "(graph f () (return (tensor int (4294967296 4294967296 16))))".parse::<Program>(),
            Err(ParseProgramError::BadLiteral(_))
        ));
        assert!(matches!(
            "(graph f () (return 1)".parse::<Program>(),
            Err(ParseProgramError::Sexp(_))
        ));
        assert!(matches!(
            "(func f () (return 1))".parse::<Program>(),
            Err(ParseProgramError::Malformed { .. })
        ));
    }
}
