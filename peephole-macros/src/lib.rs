//! Procedural macros for `peephole`.

#![warn(
    clippy::all,
    clippy::pedantic,
    anonymous_parameters,
    elided_lifetimes_in_paths,
    missing_copy_implementations,
    missing_debug_implementations,
    single_use_lifetimes,
    trivial_casts,
    unreachable_pub,
    unused_lifetimes,
    missing_docs
)]

use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

mod parse;

use parse::Rules;

/// Declares an ordered [`Vec`] of `peephole::rule::Rule`s.
///
/// Each entry is `name: PATTERN => REPLACEMENT [if CONDITION];`. The
/// replacement is anything convertible into a `Replacement` (a bound `Var`, or
/// `Replacement::build(..)`), and the optional condition is a closure over the
/// program, the bindings and the candidate node. Entries keep their written
/// order, which is the order they are tried in.
///
/// # Examples
/// ```ignore
/// rules! {
///     add_zero: Pattern::var(x) + Pattern::zero() => x;
///     mul_one: Pattern::var(x) * Pattern::one() => copy_value(x)
///         if bound_to_value(x);
/// }
/// ```
#[proc_macro]
pub fn rules(tokens: TokenStream) -> TokenStream {
    let input = parse_macro_input!(tokens as Rules);
    let output = quote! { #input };
    TokenStream::from(output)
}
