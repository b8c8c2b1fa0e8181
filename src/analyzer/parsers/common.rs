use crate::{
    analyzer::{prelude::*, Parser},
    tokenizer::{
        keyword::Keyword,
        literal::Literal,
        symbol::{Delimiter, Operator},
        token::Token,
    },
};

pub fn keyword(keyword: Keyword) -> impl Parser<Token, ()> {
    equal(Token::Keyword(keyword))
}

pub fn operator(operator: Operator) -> impl Parser<Token, ()> {
    equal(Token::Operator(operator))
}

pub fn delimiter(delimiter: Delimiter) -> impl Parser<Token, ()> {
    equal(Token::Delimiter(delimiter))
}

pub fn comma() -> impl Parser<Token, ()> {
    delimiter(Delimiter::Comma)
}

pub fn colon() -> impl Parser<Token, ()> {
    delimiter(Delimiter::Colon)
}

pub fn newline() -> impl Parser<Token, ()> {
    equal(Token::Newline)
}

pub fn indent() -> impl Parser<Token, ()> {
    equal(Token::Indent)
}

pub fn dedent() -> impl Parser<Token, ()> {
    equal(Token::Dedent)
}

pub fn identifier() -> impl Parser<Token, String> {
    satisfy(|token: &Token| match token {
        Token::Identifier(name) => Some(name.clone()),
        _ => None,
    })
}

pub fn literal() -> impl Parser<Token, Literal> {
    satisfy(|token: &Token| match token {
        Token::Literal(literal) => Some(literal.clone()),
        _ => None,
    })
}

/// Matches any of the given operators and yields which one.
pub fn operator_of<T: Copy + 'static>(table: &'static [(Operator, T)]) -> impl Parser<Token, T> {
    satisfy(move |token: &Token| match token {
        Token::Operator(op) => table
            .iter()
            .find(|(candidate, _)| candidate == op)
            .map(|(_, value)| *value),
        _ => None,
    })
}

/// `name (, name)*` with at least one name.
pub fn identifier_list() -> impl Parser<Token, Vec<String>> {
    try_map(separated_list(identifier(), comma()), |(names, _): (Vec<String>, bool)| {
        if names.is_empty() {
            Err("expected a name".to_string())
        } else {
            Ok(names)
        }
    })
}

/// `a.b.c` as a single dotted string.
pub fn dotted_name() -> impl Parser<Token, String> {
    map(
        tuple2(
            identifier(),
            many(preceded(delimiter(Delimiter::Dot), identifier())),
        ),
        |(first, rest): (String, Vec<String>)| {
            std::iter::once(first)
                .chain(rest)
                .collect::<Vec<_>>()
                .join(".")
        },
    )
}
