//! Named built-in operators.

use egg::Symbol;
use std::{
    convert::Infallible,
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// A named primitive operator.
///
/// Only the primitives that some rewrite inspects get their own variant; any
/// other name is kept as [`Primitive::Other`] so programs can mention them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    /// Elementwise tensor addition.
    Add,
    /// Elementwise tensor multiplication.
    Mul,
    /// Scalar addition.
    ScalarAdd,
    /// Scalar multiplication.
    ScalarMul,
    /// The identity function.
    Identity,
    /// A momentum optimizer update.
    Momentum,
    /// A zero tensor shaped like its operand.
    ZerosLike,
    /// Tuple construction.
    MakeTuple,
    /// Elementwise power.
    Pow,
    /// Sum over the elements of a tuple.
    AddN,
    /// Cross-worker reduction.
    AllReduce,
    /// A sub-graph's output.
    Return,
    /// Any other primitive.
    Other(Symbol),
}

impl Primitive {
    /// The primitive's name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Add => "Add",
            Self::Mul => "Mul",
            Self::ScalarAdd => "ScalarAdd",
            Self::ScalarMul => "ScalarMul",
            Self::Identity => "Identity",
            Self::Momentum => "Momentum",
            Self::ZerosLike => "ZerosLike",
            Self::MakeTuple => "MakeTuple",
            Self::Pow => "Pow",
            Self::AddN => "AddN",
            Self::AllReduce => "AllReduce",
            Self::Return => "Return",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl FromStr for Primitive {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Add" => Self::Add,
            "Mul" => Self::Mul,
            "ScalarAdd" => Self::ScalarAdd,
            "ScalarMul" => Self::ScalarMul,
            "Identity" => Self::Identity,
            "Momentum" => Self::Momentum,
            "ZerosLike" => Self::ZerosLike,
            "MakeTuple" => Self::MakeTuple,
            "Pow" => Self::Pow,
            "AddN" => Self::AddN,
            "AllReduce" => Self::AllReduce,
            "Return" => Self::Return,
            other => Self::Other(Symbol::from(other)),
        })
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for prim in &[Primitive::Mul, Primitive::AllReduce, Primitive::ZerosLike] {
            assert_eq!(prim.name().parse::<Primitive>(), Ok(*prim));
        }
        let other: Primitive = "Depend".parse().unwrap();
        assert_eq!(other, Primitive::Other(Symbol::from("Depend")));
        assert_eq!(other.to_string(), "Depend");
    }
}
