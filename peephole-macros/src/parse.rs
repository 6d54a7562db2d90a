use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::{
    parse::{Parse, ParseStream},
    Expr, Ident, LitStr, Token,
};

struct Rule {
    name: Ident,
    lhs: Expr,
    rhs: Expr,
    condition: Option<Expr>,
}

impl Parse for Rule {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let name: Ident = input.parse()?;
        input.parse::<Token![:]>()?;
        let lhs: Expr = input.parse()?;
        input.parse::<Token![=>]>()?;
        let rhs: Expr = input.parse()?;
        let condition = if input.parse::<Token![if]>().is_ok() {
            Some(input.parse()?)
        } else {
            None
        };
        input.parse::<Token![;]>()?;
        Ok(Rule {
            name,
            lhs,
            rhs,
            condition,
        })
    }
}

impl ToTokens for Rule {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let Rule {
            name,
            lhs,
            rhs,
            condition,
        } = self;
        let name = LitStr::new(&name.to_string(), name.span());

        let rule = quote! {
            ::peephole::rule::Rule::new(#name, #lhs, #rhs)
        };
        let output = match condition {
            Some(cond) => quote! { #rule.when(#cond) },
            None => rule,
        };

        output.to_tokens(tokens);
    }
}

pub(crate) struct Rules {
    rules: Vec<Rule>,
}

impl Parse for Rules {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut rules = Vec::new();
        while !input.is_empty() {
            rules.push(input.parse()?);
        }
        Ok(Rules { rules })
    }
}

impl ToTokens for Rules {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let rules = &self.rules;
        let output = quote! {
            ::std::vec![ #(#rules,)* ]
        };
        output.to_tokens(tokens);
    }
}
