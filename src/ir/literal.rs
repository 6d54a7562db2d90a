//! Embedded constants and compile-time arithmetic over them.

use ordered_float::NotNan;
use smallvec::SmallVec;
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// Element types of literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DType {
    /// Booleans.
    Bool,
    /// 64-bit signed integers.
    Int,
    /// 64-bit floats.
    Float,
}

/// An error returned when parsing an unknown element type.
#[derive(Debug, Clone, Error)]
#[error("unknown dtype `{0}`")]
pub struct ParseDTypeError(String);

impl FromStr for DType {
    type Err = ParseDTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            _ => Err(ParseDTypeError(s.to_owned())),
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
        })
    }
}

/// Dimensions of a tensor. A scalar has no dimensions.
pub type Shape = SmallVec<[usize; 4]>;

/// The abstract type of a node: an element type and a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    /// The element type.
    pub dtype: DType,
    /// The shape; empty for scalars.
    pub shape: Shape,
}

impl TensorType {
    /// Creates a tensor type.
    #[must_use]
    pub fn new<I: IntoIterator<Item = usize>>(dtype: DType, shape: I) -> Self {
        Self {
            dtype,
            shape: shape.into_iter().collect(),
        }
    }
}

impl Display for TensorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dtype)?;
        if !self.shape.is_empty() {
            let dims: Vec<_> = self.shape.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", dims.join(","))?;
        }
        Ok(())
    }
}

/// A single scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float which is never NaN.
    Float(NotNan<f64>),
}

impl Scalar {
    /// The element type of this scalar.
    #[must_use]
    pub fn dtype(self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int(_) => DType::Int,
            Self::Float(_) => DType::Float,
        }
    }

    /// Converts `value` into a scalar of type `dtype`. Booleans are true for
    /// any non-zero value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn of(dtype: DType, value: i64) -> Self {
        match dtype {
            DType::Bool => Self::Bool(value != 0),
            DType::Int => Self::Int(value),
            DType::Float => match NotNan::new(value as f64) {
                Ok(x) => Self::Float(x),
                Err(_) => Self::Int(value),
            },
        }
    }

    /// Returns `true` if this scalar is numerically equal to `value`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn equals(self, value: i64) -> bool {
        match self {
            Self::Bool(_) => false,
            Self::Int(i) => i == value,
            Self::Float(x) => x.into_inner() == value as f64,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_float(self) -> Option<f64> {
        match self {
            Self::Bool(_) => None,
            Self::Int(i) => Some(i as f64),
            Self::Float(x) => Some(x.into_inner()),
        }
    }

    fn combine(self, other: Self, op: FoldOp) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => match op {
                FoldOp::Add => a.checked_add(b),
                FoldOp::Mul => a.checked_mul(b),
            }
            .map(Self::Int),
            (Self::Bool(_), _) | (_, Self::Bool(_)) => None,
            (a, b) => {
                let (a, b) = (a.as_float()?, b.as_float()?);
                let result = match op {
                    FoldOp::Add => a + b,
                    FoldOp::Mul => a * b,
                };
                NotNan::new(result).ok().map(Self::Float)
            }
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            // Debug keeps the decimal point, so the text re-reads as a float.
            Self::Float(x) => write!(f, "{:?}", x.into_inner()),
        }
    }
}

/// The number of elements in a tensor of the given shape, or [`None`] on
/// overflow.
fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
}

/// A dense tensor constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    data: Vec<Scalar>,
}

impl Tensor {
    /// Creates a tensor, returning [`None`] if the number of elements does not
    /// match the shape or some element is not of type `dtype`.
    #[must_use]
    pub fn new<I: IntoIterator<Item = usize>>(
        dtype: DType,
        shape: I,
        data: Vec<Scalar>,
    ) -> Option<Self> {
        let shape: Shape = shape.into_iter().collect();
        let len = element_count(&shape)?;
        if len != data.len() || data.iter().any(|x| x.dtype() != dtype) {
            return None;
        }
        Some(Self { dtype, shape, data })
    }

    /// The element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// The shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The elements, in row-major order.
    #[must_use]
    pub fn data(&self) -> &[Scalar] {
        &self.data
    }
}

/// An embedded constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// A scalar constant.
    Scalar(Scalar),
    /// A tensor constant.
    Tensor(Tensor),
}

/// Operations that [`fold`] can evaluate at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FoldOp {
    /// Addition.
    Add,
    /// Multiplication.
    Mul,
}

impl Literal {
    /// An integer literal.
    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Scalar(Scalar::Int(value))
    }

    /// A float literal, or [`None`] for NaN.
    #[must_use]
    pub fn float(value: f64) -> Option<Self> {
        NotNan::new(value).ok().map(|x| Self::Scalar(Scalar::Float(x)))
    }

    /// A literal of type `ty` with every element equal to `value`, or [`None`]
    /// if the shape has too many elements.
    #[must_use]
    pub fn filled(ty: &TensorType, value: i64) -> Option<Self> {
        let elem = Scalar::of(ty.dtype, value);
        if ty.shape.is_empty() {
            return Some(Self::Scalar(elem));
        }
        let len = element_count(&ty.shape)?;
        Some(Self::Tensor(Tensor {
            dtype: ty.dtype,
            shape: ty.shape.clone(),
            data: vec![elem; len],
        }))
    }

    /// Returns `true` for scalar literals.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// Returns `true` if this is a scalar equal to `value`, or a non-empty
    /// tensor all of whose elements equal `value`.
    #[must_use]
    pub fn is_uniformly(&self, value: i64) -> bool {
        match self {
            Self::Scalar(x) => x.equals(value),
            Self::Tensor(t) => !t.data.is_empty() && t.data.iter().all(|x| x.equals(value)),
        }
    }

    /// The type of this literal.
    #[must_use]
    pub fn ty(&self) -> TensorType {
        match self {
            Self::Scalar(x) => TensorType::new(x.dtype(), []),
            Self::Tensor(t) => TensorType {
                dtype: t.dtype,
                shape: t.shape.clone(),
            },
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(x) => x.fmt(f),
            Self::Tensor(t) => {
                write!(f, "(tensor {} (", t.dtype)?;
                for (i, dim) in t.shape.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", dim)?;
                }
                f.write_str(")")?;
                for x in &t.data {
                    write!(f, " {}", x)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Evaluates `a op b` at compile time.
///
/// Returns [`None`] when the result is not representable as a literal: integer
/// overflow, a NaN result, boolean operands, or tensors whose shapes differ.
/// A scalar operand is broadcast over a tensor operand.
#[must_use]
pub fn fold(a: &Literal, b: &Literal, op: FoldOp) -> Option<Literal> {
    match (a, b) {
        (Literal::Scalar(x), Literal::Scalar(y)) => x.combine(*y, op).map(Literal::Scalar),
        (Literal::Scalar(x), Literal::Tensor(t)) => map_tensor(t, |y| x.combine(y, op)),
        (Literal::Tensor(t), Literal::Scalar(y)) => map_tensor(t, |x| x.combine(*y, op)),
        (Literal::Tensor(s), Literal::Tensor(t)) => {
            if s.shape != t.shape {
                return None;
            }
            let data = s
                .data
                .iter()
                .zip(&t.data)
                .map(|(x, y)| x.combine(*y, op))
                .collect::<Option<Vec<_>>>()?;
            tensor_from(s.shape.clone(), data)
        }
    }
}

fn map_tensor<F>(t: &Tensor, f: F) -> Option<Literal>
where
    F: FnMut(Scalar) -> Option<Scalar>,
{
    let data = t.data.iter().copied().map(f).collect::<Option<Vec<_>>>()?;
    tensor_from(t.shape.clone(), data)
}

/// Builds a tensor whose dtype is taken from its (uniformly typed) elements.
fn tensor_from(shape: Shape, data: Vec<Scalar>) -> Option<Literal> {
    let dtype = match data.first() {
        Some(x) => x.dtype(),
        None => return None,
    };
    Tensor::new(dtype, shape, data).map(Literal::Tensor)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ints(shape: &[usize], data: &[i64]) -> Literal {
        Literal::Tensor(
            Tensor::new(
                DType::Int,
                shape.iter().copied(),
                data.iter().copied().map(Scalar::Int).collect(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_fold_scalars() {
        assert_eq!(
            fold(&Literal::int(2), &Literal::int(3), FoldOp::Mul),
            Some(Literal::int(6))
        );
        assert_eq!(
            fold(&Literal::int(2), &Literal::float(0.5).unwrap(), FoldOp::Mul),
            Literal::float(1.0)
        );
        assert_eq!(fold(&Literal::int(i64::MAX), &Literal::int(2), FoldOp::Mul), None);
        assert_eq!(
            fold(&Literal::Scalar(Scalar::Bool(true)), &Literal::int(1), FoldOp::Add),
            None
        );
    }

    #[test]
    fn test_fold_tensors() {
        assert_eq!(
            fold(&Literal::int(2), &ints(&[2], &[1, 4]), FoldOp::Mul),
            Some(ints(&[2], &[2, 8]))
        );
        assert_eq!(
            fold(&ints(&[2], &[1, 2]), &ints(&[2], &[3, 4]), FoldOp::Add),
            Some(ints(&[2], &[4, 6]))
        );
        assert_eq!(fold(&ints(&[2], &[1, 2]), &ints(&[3], &[1, 2, 3]), FoldOp::Mul), None);
    }

    #[test]
    fn test_uniform_values() {
        assert!(Literal::int(0).is_uniformly(0));
        assert!(Literal::float(1.0).unwrap().is_uniformly(1));
        assert!(ints(&[2, 2], &[1, 1, 1, 1]).is_uniformly(1));
        assert!(!ints(&[2], &[1, 0]).is_uniformly(1));
        assert!(!ints(&[0], &[]).is_uniformly(0));
        assert!(!Literal::Scalar(Scalar::Bool(false)).is_uniformly(0));
    }

    #[test]
    fn test_filled() {
        let ty = TensorType::new(DType::Float, [2]);
        let zeros = Literal::filled(&ty, 0).unwrap();
        assert_eq!(zeros.ty(), ty);
        assert!(zeros.is_uniformly(0));
        assert_eq!(zeros.to_string(), "(tensor float (2) 0.0 0.0)");
        assert_eq!(
            Literal::filled(&TensorType::new(DType::Int, []), 0),
            Some(Literal::int(0))
        );
    }

    #[test]
    fn test_element_count_overflow() {
        let huge: [usize; 3] = [1 << 32, 1 << 32, 16];
        assert_eq!(Literal::filled(&TensorType::new(DType::Int, huge), 0), None);
        assert_eq!(Tensor::new(DType::Int, huge, vec![]), None);
        let empty = Tensor::new(DType::Int, [0, usize::MAX, 2], vec![]).unwrap();
        assert!(empty.data().is_empty());
    }
}
