//! # Operators and delimiters
//!
//! Symbols are matched longest first, so `**=` wins over `**` and `*`.

use nom::{
    branch::alt,
    bytes::complete::tag,
    combinator::{map, value},
    error::context,
};
use strum_macros::{AsRefStr, Display, EnumString};

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Operator {
    #[strum(serialize = "**=")]
    PowerAssign,
    #[strum(serialize = "//=")]
    FloorDivideAssign,
    #[strum(serialize = "+=")]
    PlusAssign,
    #[strum(serialize = "-=")]
    MinusAssign,
    #[strum(serialize = "*=")]
    MultiplyAssign,
    #[strum(serialize = "/=")]
    DivideAssign,
    #[strum(serialize = "%=")]
    ModuloAssign,

    #[strum(serialize = "**")]
    Power,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "->")]
    ThinArrow,

    #[strum(serialize = "==")]
    EqualEqual,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,

    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "=")]
    Assign,
}

impl Operator {
    pub fn is_augmented_assign(&self) -> bool {
        matches!(
            self,
            Operator::PowerAssign
                | Operator::FloorDivideAssign
                | Operator::PlusAssign
                | Operator::MinusAssign
                | Operator::MultiplyAssign
                | Operator::DivideAssign
                | Operator::ModuloAssign
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Delimiter {
    #[strum(serialize = "(")]
    OpenParen,
    #[strum(serialize = ")")]
    CloseParen,
    #[strum(serialize = "[")]
    OpenBracket,
    #[strum(serialize = "]")]
    CloseBracket,
    #[strum(serialize = "{")]
    OpenBrace,
    // strum cannot take a bare closing brace as a serialize value
    #[strum(serialize = "CLOSE_BRACE")]
    CloseBrace,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = ";")]
    Semicolon,
}

impl Delimiter {
    /// +1 for an opening bracket, -1 for a closing one, 0 otherwise.
    pub fn depth_change(&self) -> i32 {
        match self {
            Delimiter::OpenParen | Delimiter::OpenBracket | Delimiter::OpenBrace => 1,
            Delimiter::CloseParen | Delimiter::CloseBracket | Delimiter::CloseBrace => -1,
            _ => 0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Delimiter::OpenParen => "(",
            Delimiter::CloseParen => ")",
            Delimiter::OpenBracket => "[",
            Delimiter::CloseBracket => "]",
            Delimiter::OpenBrace => "{",
            Delimiter::CloseBrace => "}",
            Delimiter::Comma => ",",
            Delimiter::Colon => ":",
            Delimiter::Dot => ".",
            Delimiter::Semicolon => ";",
        }
    }
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_operator(input: &str) -> ParserResult<Token> {
    context(
        "operator",
        map(
            alt((
                alt((
                    value(Operator::PowerAssign, tag("**=")),
                    value(Operator::FloorDivideAssign, tag("//=")),
                    value(Operator::PlusAssign, tag("+=")),
                    value(Operator::MinusAssign, tag("-=")),
                    value(Operator::MultiplyAssign, tag("*=")),
                    value(Operator::DivideAssign, tag("/=")),
                    value(Operator::ModuloAssign, tag("%=")),
                    value(Operator::Power, tag("**")),
                    value(Operator::FloorDivide, tag("//")),
                    value(Operator::ThinArrow, tag("->")),
                    value(Operator::EqualEqual, tag("==")),
                    value(Operator::NotEqual, tag("!=")),
                    value(Operator::LessEqual, tag("<=")),
                    value(Operator::GreaterEqual, tag(">=")),
                )),
                alt((
                    value(Operator::Less, tag("<")),
                    value(Operator::Greater, tag(">")),
                    value(Operator::Plus, tag("+")),
                    value(Operator::Minus, tag("-")),
                    value(Operator::Multiply, tag("*")),
                    value(Operator::Divide, tag("/")),
                    value(Operator::Modulo, tag("%")),
                    value(Operator::Assign, tag("=")),
                )),
            )),
            Token::Operator,
        ),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_delimiter(input: &str) -> ParserResult<Token> {
    context(
        "delimiter",
        map(
            alt((
                value(Delimiter::OpenParen, tag("(")),
                value(Delimiter::CloseParen, tag(")")),
                value(Delimiter::OpenBracket, tag("[")),
                value(Delimiter::CloseBracket, tag("]")),
                value(Delimiter::OpenBrace, tag("{")),
                value(Delimiter::CloseBrace, tag("}")),
                value(Delimiter::Comma, tag(",")),
                value(Delimiter::Colon, tag(":")),
                value(Delimiter::Dot, tag(".")),
                value(Delimiter::Semicolon, tag(";")),
            )),
            Token::Delimiter,
        ),
    )(input)
}
