//! A parser for s-expressions, the surface syntax of program files.

use std::{
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
};

/// S-expressions
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sexp<'a> {
    /// An atomic s-expression
    Atom(&'a str),
    /// A parenthesized list, possibly empty
    List(Vec<Self>),
}

impl<'a> Sexp<'a> {
    /// Parses a string holding exactly one s-expression.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a single valid s-expression.
    pub fn parse(s: &'a str) -> Result<Self, ParseSexpError> {
        parse::parse_sexp(s)
    }

    /// Parses a string holding any number of s-expressions.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a sequence of valid
    /// s-expressions.
    pub fn parse_many(s: &'a str) -> Result<Vec<Self>, ParseSexpError> {
        parse::parse_sexps(s)
    }

    /// If this is a list whose first element is an atom, returns that atom and
    /// the remaining elements.
    #[must_use]
    pub fn as_form(&self) -> Option<(&'a str, &[Self])> {
        match self {
            Self::List(items) => match items.split_first() {
                Some((Self::Atom(head), rest)) => Some((*head, rest)),
                _ => None,
            },
            Self::Atom(_) => None,
        }
    }
}

impl<'a> TryFrom<&'a str> for Sexp<'a> {
    type Error = ParseSexpError;

    fn try_from(s: &'a str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

pub use parse::ParseSexpError;

mod parse {
    use super::Sexp;
    use nom::{
        branch::alt,
        character::complete::{char, multispace1, none_of, not_line_ending},
        combinator::{all_consuming, map, opt, recognize},
        error::{convert_error, VerboseError},
        multi::{many0, many1_count},
        sequence::{delimited, preceded, terminated},
        Finish, IResult,
    };
    use std::fmt::{self, Debug, Formatter};
    use thiserror::Error;

    type ParseResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

    /// An error while parsing an s-expression
    #[allow(clippy::module_name_repetitions)]
    #[derive(Clone, Error)]
    #[error("{0}")]
    pub struct ParseSexpError(String);

    impl Debug for ParseSexpError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    fn comment(input: &str) -> ParseResult<'_, &str> {
        recognize(preceded(char(';'), not_line_ending))(input)
    }

    fn whitespace(input: &str) -> ParseResult<'_, &str> {
        recognize(many1_count(alt((comment, multispace1))))(input)
    }

    fn symbol(input: &str) -> ParseResult<'_, &str> {
        recognize(many1_count(none_of(";() \t\n\r")))(input)
    }

    fn atom(input: &str) -> ParseResult<'_, Sexp<'_>> {
        map(symbol, Sexp::Atom)(input)
    }

    fn list(input: &str) -> ParseResult<'_, Sexp<'_>> {
        map(
            delimited(
                terminated(char('('), opt(whitespace)),
                many0(terminated(sexp, opt(whitespace))),
                char(')'),
            ),
            Sexp::List,
        )(input)
    }

    fn sexp(input: &str) -> ParseResult<'_, Sexp<'_>> {
        alt((list, atom))(input)
    }

    fn program(input: &str) -> ParseResult<'_, Sexp<'_>> {
        all_consuming(delimited(opt(whitespace), sexp, opt(whitespace)))(input)
    }

    fn programs(input: &str) -> ParseResult<'_, Vec<Sexp<'_>>> {
        all_consuming(preceded(
            opt(whitespace),
            many0(terminated(sexp, opt(whitespace))),
        ))(input)
    }

    pub(super) fn parse_sexp(input: &str) -> Result<Sexp<'_>, ParseSexpError> {
        program(input)
            .finish()
            .map(|(_, sexp)| sexp)
            .map_err(|e| ParseSexpError(convert_error(input, e)))
    }

    pub(super) fn parse_sexps(input: &str) -> Result<Vec<Sexp<'_>>, ParseSexpError> {
        programs(input)
            .finish()
            .map(|(_, sexps)| sexps)
            .map_err(|e| ParseSexpError(convert_error(input, e)))
    }

}

impl<'a> Debug for Sexp<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(atom) => write!(f, "{:?}", atom),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    Debug::fmt(item, f)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl<'a> Display for Sexp<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(atom) => f.write_str(atom),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    Display::fmt(item, f)?;
                }
                f.write_str(")")
            }
        }
    }
}
