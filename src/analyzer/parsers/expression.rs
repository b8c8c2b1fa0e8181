use super::common::*;
use crate::{
    analyzer::{prelude::*, Parser},
    ast::{
        Argument, BinaryOperator, BoolOperator, CompareOperator, Comprehension, Constant,
        Expression, FStringPart, Index, Parameter, Target, UnaryOperator,
    },
    tokenizer::{
        keyword::Keyword,
        literal::{Literal, StringPart},
        symbol::{Delimiter, Operator},
        token::Token,
    },
};

const COMPARE_OPERATORS: &[(Operator, CompareOperator)] = &[
    (Operator::EqualEqual, CompareOperator::Equal),
    (Operator::NotEqual, CompareOperator::NotEqual),
    (Operator::LessEqual, CompareOperator::LessEqual),
    (Operator::GreaterEqual, CompareOperator::GreaterEqual),
    (Operator::Less, CompareOperator::Less),
    (Operator::Greater, CompareOperator::Greater),
];

const ARITH_OPERATORS: &[(Operator, BinaryOperator)] = &[
    (Operator::Plus, BinaryOperator::Add),
    (Operator::Minus, BinaryOperator::Subtract),
];

const TERM_OPERATORS: &[(Operator, BinaryOperator)] = &[
    (Operator::Multiply, BinaryOperator::Multiply),
    (Operator::Divide, BinaryOperator::Divide),
    (Operator::FloorDivide, BinaryOperator::FloorDivide),
    (Operator::Modulo, BinaryOperator::Modulo),
];

const UNARY_OPERATORS: &[(Operator, UnaryOperator)] = &[
    (Operator::Minus, UnaryOperator::Negate),
    (Operator::Plus, UnaryOperator::Plus),
];

// Boxed entry points for the recursive rules.

pub(crate) fn expression() -> Box<dyn Parser<Token, Expression>> {
    Box::new(lazy(parse_expression))
}

fn factor() -> Box<dyn Parser<Token, Expression>> {
    Box::new(lazy(parse_factor))
}

fn not_test() -> Box<dyn Parser<Token, Expression>> {
    Box::new(lazy(parse_not))
}

fn target_list() -> Box<dyn Parser<Token, Target>> {
    Box::new(lazy(parse_target_list))
}

pub fn parse_expression() -> impl Parser<Token, Expression> {
    with_context(
        choice(vec![
            Box::new(parse_lambda()),
            Box::new(lazy(parse_conditional)),
        ]),
        "expression",
    )
}

/// One or more comma separated expressions. More than one (or a trailing
/// comma) makes a tuple.
pub fn parse_expression_list() -> impl Parser<Token, Expression> {
    try_map(
        separated_list(expression(), comma()),
        |(items, trailing): (Vec<Expression>, bool)| tuple_or_single(items, trailing),
    )
}

fn tuple_or_single(mut items: Vec<Expression>, trailing: bool) -> Result<Expression, String> {
    match items.len() {
        0 => Err("invalid syntax".to_string()),
        1 if !trailing => Ok(items.remove(0)),
        _ => Ok(Expression::Tuple(items)),
    }
}

fn parse_lambda() -> impl Parser<Token, Expression> {
    map(
        tuple4(
            keyword(Keyword::Lambda),
            parse_parameters(),
            colon(),
            expression(),
        ),
        |((), params, (), body)| Expression::Lambda {
            params,
            body: Box::new(body),
        },
    )
}

/// Parameter list of a `def` or `lambda`, without the surrounding parens.
pub fn parse_parameters() -> impl Parser<Token, Vec<Parameter>> {
    try_map(
        separated_list(
            map(
                tuple2(
                    identifier(),
                    optional(preceded(operator(Operator::Assign), expression())),
                ),
                |(name, default)| Parameter { name, default },
            ),
            comma(),
        ),
        |(params, _): (Vec<Parameter>, bool)| validate_parameters(params),
    )
}

pub(crate) fn validate_parameters(params: Vec<Parameter>) -> Result<Vec<Parameter>, String> {
    let mut seen_default = false;
    for (i, param) in params.iter().enumerate() {
        if params[..i].iter().any(|earlier| earlier.name == param.name) {
            return Err(format!(
                "duplicate argument '{}' in function definition",
                param.name
            ));
        }
        match param.default {
            Some(_) => seen_default = true,
            None if seen_default => {
                return Err("non-default argument follows default argument".to_string())
            }
            None => {}
        }
    }
    Ok(params)
}

fn parse_conditional() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            lazy(parse_or),
            optional(tuple4(
                keyword(Keyword::If),
                lazy(parse_or),
                keyword(Keyword::Else),
                expression(),
            )),
        ),
        |(then, tail)| match tail {
            Some(((), condition, (), otherwise)) => Expression::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            None => then,
        },
    )
}

fn fold_bool(op: BoolOperator, first: Expression, rest: Vec<Expression>) -> Expression {
    rest.into_iter()
        .fold(first, |left, right| Expression::BoolOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
}

fn fold_binary(first: Expression, rest: Vec<(BinaryOperator, Expression)>) -> Expression {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
}

pub fn parse_or() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            lazy(parse_and),
            many(preceded(keyword(Keyword::Or), lazy(parse_and))),
        ),
        |(first, rest)| fold_bool(BoolOperator::Or, first, rest),
    )
}

fn parse_and() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            not_test(),
            many(preceded(keyword(Keyword::And), not_test())),
        ),
        |(first, rest)| fold_bool(BoolOperator::And, first, rest),
    )
}

fn parse_not() -> impl Parser<Token, Expression> {
    choice(vec![
        Box::new(map(preceded(keyword(Keyword::Not), not_test()), |operand| {
            Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            }
        })),
        Box::new(lazy(parse_comparison)),
    ])
}

fn parse_comparison() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            lazy(parse_arith),
            many(tuple2(parse_compare_operator(), lazy(parse_arith))),
        ),
        |(left, comparisons): (Expression, Vec<(CompareOperator, Expression)>)| {
            if comparisons.is_empty() {
                left
            } else {
                Expression::Compare {
                    left: Box::new(left),
                    comparisons,
                }
            }
        },
    )
}

fn parse_compare_operator() -> impl Parser<Token, CompareOperator> {
    choice(vec![
        Box::new(operator_of(COMPARE_OPERATORS)),
        Box::new(map(
            tuple2(keyword(Keyword::Not), keyword(Keyword::In)),
            |_| CompareOperator::NotIn,
        )),
        Box::new(map(
            tuple2(keyword(Keyword::Is), keyword(Keyword::Not)),
            |_| CompareOperator::IsNot,
        )),
        Box::new(map(keyword(Keyword::Is), |_| CompareOperator::Is)),
        Box::new(map(keyword(Keyword::In), |_| CompareOperator::In)),
    ])
}

fn parse_arith() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            lazy(parse_term),
            many(tuple2(operator_of(ARITH_OPERATORS), lazy(parse_term))),
        ),
        |(first, rest)| fold_binary(first, rest),
    )
}

fn parse_term() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            factor(),
            many(tuple2(operator_of(TERM_OPERATORS), factor())),
        ),
        |(first, rest)| fold_binary(first, rest),
    )
}

fn parse_factor() -> impl Parser<Token, Expression> {
    choice(vec![
        Box::new(map(
            tuple2(operator_of(UNARY_OPERATORS), factor()),
            |(op, operand)| Expression::UnaryOp {
                op,
                operand: Box::new(operand),
            },
        )),
        Box::new(lazy(parse_power)),
    ])
}

/// `**` binds tighter than a unary minus on its left and looser on its right,
/// so `-2 ** -1` is `-(2 ** (-1))`.
fn parse_power() -> impl Parser<Token, Expression> {
    map(
        tuple2(
            lazy(parse_postfix),
            optional(preceded(operator(Operator::Power), factor())),
        ),
        |(base, exponent)| match exponent {
            Some(exponent) => Expression::BinaryOp {
                op: BinaryOperator::Power,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            None => base,
        },
    )
}

enum Trailer {
    Call(Vec<Argument>),
    Index(Index),
    Attribute(String),
}

fn apply_trailer(value: Expression, trailer: Trailer) -> Expression {
    let value = Box::new(value);
    match trailer {
        Trailer::Call(arguments) => Expression::Call {
            function: value,
            arguments,
        },
        Trailer::Index(index) => Expression::Subscript {
            value,
            index: Box::new(index),
        },
        Trailer::Attribute(name) => Expression::Attribute { value, name },
    }
}

fn parse_postfix() -> impl Parser<Token, Expression> {
    map(
        tuple2(parse_atom(), many(parse_trailer())),
        |(atom, trailers): (Expression, Vec<Trailer>)| {
            trailers.into_iter().fold(atom, apply_trailer)
        },
    )
}

fn parse_trailer() -> impl Parser<Token, Trailer> {
    choice(vec![
        Box::new(map(
            delimited(
                delimiter(Delimiter::OpenParen),
                parse_arguments(),
                delimiter(Delimiter::CloseParen),
            ),
            Trailer::Call,
        )),
        Box::new(map(
            delimited(
                delimiter(Delimiter::OpenBracket),
                parse_subscript(),
                delimiter(Delimiter::CloseBracket),
            ),
            Trailer::Index,
        )),
        Box::new(map(
            preceded(delimiter(Delimiter::Dot), identifier()),
            Trailer::Attribute,
        )),
    ])
}

fn parse_arguments() -> impl Parser<Token, Vec<Argument>> {
    try_map(
        separated_list(parse_argument(), comma()),
        |(arguments, _): (Vec<Argument>, bool)| {
            let first_keyword = arguments
                .iter()
                .position(|argument| matches!(argument, Argument::Keyword(..)));
            if let Some(first_keyword) = first_keyword {
                if arguments[first_keyword..]
                    .iter()
                    .any(|argument| matches!(argument, Argument::Positional(_)))
                {
                    return Err("positional argument follows keyword argument".to_string());
                }
            }
            Ok(arguments)
        },
    )
}

fn parse_argument() -> impl Parser<Token, Argument> {
    choice(vec![
        Box::new(map(
            tuple3(identifier(), operator(Operator::Assign), expression()),
            |(name, (), value)| Argument::Keyword(name, value),
        )),
        Box::new(map(parse_expression_or_comprehension(), Argument::Positional)),
    ])
}

fn parse_subscript() -> impl Parser<Token, Index> {
    try_map(
        tuple2(
            optional(parse_expression_list()),
            optional(tuple2(
                preceded(colon(), optional(expression())),
                optional(preceded(colon(), optional(expression()))),
            )),
        ),
        |(lower, slice)| match (lower, slice) {
            (Some(index), None) => Ok(Index::Single(index)),
            (None, None) => Err("invalid syntax".to_string()),
            (lower, Some((upper, step))) => Ok(Index::Slice {
                lower,
                upper,
                step: step.flatten(),
            }),
        },
    )
}

/// An expression optionally followed by `for` clauses, as found inside
/// brackets and call parentheses.
fn parse_expression_or_comprehension() -> impl Parser<Token, Expression> {
    map(
        tuple2(expression(), many(parse_comprehension())),
        |(element, generators): (Expression, Vec<Comprehension>)| {
            if generators.is_empty() {
                element
            } else {
                Expression::ListComp {
                    element: Box::new(element),
                    generators,
                }
            }
        },
    )
}

fn parse_comprehension() -> impl Parser<Token, Comprehension> {
    map(
        tuple2(
            tuple4(
                keyword(Keyword::For),
                target_list(),
                keyword(Keyword::In),
                lazy(parse_or),
            ),
            many(preceded(keyword(Keyword::If), lazy(parse_or))),
        ),
        |(((), target, (), iter), conditions): ((_, Target, _, Expression), Vec<Expression>)| {
            let condition = conditions.into_iter().reduce(|left, right| Expression::BoolOp {
                op: BoolOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            });
            Comprehension {
                target,
                iter,
                condition,
            }
        },
    )
}

/// Binding targets of `for` loops and comprehensions.
pub fn parse_target_list() -> impl Parser<Token, Target> {
    try_map(
        separated_list(parse_target_atom(), comma()),
        |(mut items, trailing): (Vec<Target>, bool)| match items.len() {
            0 => Err("invalid syntax".to_string()),
            1 if !trailing => Ok(items.remove(0)),
            _ => Ok(Target::Tuple(items)),
        },
    )
}

fn parse_target_atom() -> impl Parser<Token, Target> {
    choice(vec![
        Box::new(map(identifier(), Target::Name)),
        Box::new(delimited(
            delimiter(Delimiter::OpenParen),
            target_list(),
            delimiter(Delimiter::CloseParen),
        )),
        Box::new(delimited(
            delimiter(Delimiter::OpenBracket),
            target_list(),
            delimiter(Delimiter::CloseBracket),
        )),
    ])
}

fn parse_atom() -> impl Parser<Token, Expression> {
    choice(vec![
        Box::new(map(identifier(), Expression::Name)),
        Box::new(parse_constant()),
        Box::new(parse_strings()),
        Box::new(parse_parenthesized()),
        Box::new(parse_list_display()),
        Box::new(parse_dict_display()),
    ])
}

fn parse_constant() -> impl Parser<Token, Expression> {
    satisfy(|token: &Token| {
        let constant = match token {
            Token::Keyword(Keyword::True) => Constant::Boolean(true),
            Token::Keyword(Keyword::False) => Constant::Boolean(false),
            Token::Keyword(Keyword::None) => Constant::None,
            Token::Literal(Literal::Integer(n)) => Constant::Integer(*n),
            Token::Literal(Literal::Float(x)) => Constant::Float(*x),
            _ => return None,
        };
        Some(Expression::Constant(constant))
    })
}

/// Adjacent string literals concatenate. Any f-string among them turns the
/// whole run into an f-string.
fn parse_strings() -> impl Parser<Token, Expression> {
    try_map(
        many1(satisfy(|token: &Token| match token {
            Token::Literal(literal @ (Literal::String(_) | Literal::FString(_))) => {
                Some(literal.clone())
            }
            _ => None,
        })),
        |pieces: Vec<Literal>| join_strings(pieces),
    )
}

fn push_text(parts: &mut Vec<FStringPart>, text: String) {
    if text.is_empty() {
        return;
    }
    match parts.last_mut() {
        Some(FStringPart::Text(previous)) => previous.push_str(&text),
        _ => parts.push(FStringPart::Text(text)),
    }
}

fn join_strings(pieces: Vec<Literal>) -> Result<Expression, String> {
    if pieces.iter().all(|piece| matches!(piece, Literal::String(_))) {
        let text = pieces
            .into_iter()
            .filter_map(|piece| match piece {
                Literal::String(text) => Some(text),
                _ => None,
            })
            .collect::<String>();
        return Ok(Expression::Constant(Constant::Str(text)));
    }

    let mut parts = Vec::new();
    for piece in pieces {
        match piece {
            Literal::String(text) => push_text(&mut parts, text),
            Literal::FString(fragments) => {
                for fragment in fragments {
                    match fragment {
                        StringPart::Literal(text) => push_text(&mut parts, text),
                        StringPart::Interpolation {
                            expression,
                            conversion,
                            format_spec,
                        } => {
                            let parsed = crate::analyzer::parse_expression_source(&expression)
                                .map_err(|e| format!("f-string: {}", e))?;
                            parts.push(FStringPart::Field {
                                expression: Box::new(parsed),
                                conversion,
                                format_spec,
                            });
                        }
                    }
                }
            }
            Literal::Integer(_) | Literal::Float(_) => {}
        }
    }
    Ok(Expression::FString(parts))
}

/// `()`, `(x)`, `(x,)`, `(x, y)` and `(x for x in y)`.
fn parse_parenthesized() -> impl Parser<Token, Expression> {
    try_map(
        delimited(
            delimiter(Delimiter::OpenParen),
            separated_list(parse_expression_or_comprehension(), comma()),
            delimiter(Delimiter::CloseParen),
        ),
        |(items, trailing): (Vec<Expression>, bool)| {
            if items.is_empty() {
                return Ok(Expression::Tuple(vec![]));
            }
            check_comprehension_alone(&items, trailing)?;
            tuple_or_single(items, trailing)
        },
    )
}

fn parse_list_display() -> impl Parser<Token, Expression> {
    try_map(
        delimited(
            delimiter(Delimiter::OpenBracket),
            separated_list(parse_expression_or_comprehension(), comma()),
            delimiter(Delimiter::CloseBracket),
        ),
        |(mut items, trailing): (Vec<Expression>, bool)| {
            check_comprehension_alone(&items, trailing)?;
            if items.len() == 1 && !trailing && matches!(items[0], Expression::ListComp { .. }) {
                return Ok(items.remove(0));
            }
            Ok(Expression::List(items))
        },
    )
}

/// A comprehension has to be the only thing between its brackets.
fn check_comprehension_alone(items: &[Expression], trailing: bool) -> Result<(), String> {
    let alone = items.len() == 1 && !trailing;
    if !alone && items.iter().any(|item| matches!(item, Expression::ListComp { .. })) {
        return Err("invalid syntax: comprehension must be parenthesized".to_string());
    }
    Ok(())
}

fn parse_dict_display() -> impl Parser<Token, Expression> {
    map(
        delimited(
            delimiter(Delimiter::OpenBrace),
            separated_list(
                map(
                    tuple3(expression(), colon(), expression()),
                    |(key, (), value)| (key, value),
                ),
                comma(),
            ),
            delimiter(Delimiter::CloseBrace),
        ),
        |(entries, _): (Vec<(Expression, Expression)>, bool)| Expression::Dict(entries),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{preprocessor::Preprocessor, tokenizer::token::Tokenizer};

    fn tokens(source: &str) -> Vec<Token> {
        let spans = Tokenizer::new().tokenize(source).unwrap();
        Preprocessor::new().process(spans).unwrap().tokens
    }

    fn parse(source: &str) -> Expression {
        let input = tokens(source);
        let (pos, expression) = parse_expression_list().parse(&input, 0).unwrap();
        assert_eq!(input[pos], Token::Newline, "unparsed input in {:?}", source);
        expression
    }

    fn name(n: &str) -> Expression {
        Expression::Name(n.to_string())
    }

    fn int(n: i64) -> Expression {
        Expression::Constant(Constant::Integer(n))
    }

    fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + 2 * 3"),
            binary(
                BinaryOperator::Add,
                int(1),
                binary(BinaryOperator::Multiply, int(2), int(3))
            )
        );
        assert_eq!(
            parse("1 - 2 - 3"),
            binary(
                BinaryOperator::Subtract,
                binary(BinaryOperator::Subtract, int(1), int(2)),
                int(3)
            )
        );
    }

    #[test]
    fn test_power_is_right_associative_and_binds_over_negation() {
        assert_eq!(
            parse("-2 ** 2"),
            Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(binary(BinaryOperator::Power, int(2), int(2))),
            }
        );
        assert_eq!(
            parse("2 ** 3 ** 2"),
            binary(
                BinaryOperator::Power,
                int(2),
                binary(BinaryOperator::Power, int(3), int(2))
            )
        );
    }

    #[test]
    fn test_comparison_chain() {
        assert_eq!(
            parse("a < b <= c"),
            Expression::Compare {
                left: Box::new(name("a")),
                comparisons: vec![
                    (CompareOperator::Less, name("b")),
                    (CompareOperator::LessEqual, name("c")),
                ],
            }
        );
        assert_eq!(
            parse("x not in xs"),
            Expression::Compare {
                left: Box::new(name("x")),
                comparisons: vec![(CompareOperator::NotIn, name("xs"))],
            }
        );
        assert_eq!(
            parse("x is not None"),
            Expression::Compare {
                left: Box::new(name("x")),
                comparisons: vec![(
                    CompareOperator::IsNot,
                    Expression::Constant(Constant::None)
                )],
            }
        );
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            parse("not a or b and c"),
            Expression::BoolOp {
                op: BoolOperator::Or,
                left: Box::new(Expression::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: Box::new(name("a")),
                }),
                right: Box::new(Expression::BoolOp {
                    op: BoolOperator::And,
                    left: Box::new(name("b")),
                    right: Box::new(name("c")),
                }),
            }
        );
    }

    #[test]
    fn test_conditional_expression() {
        assert_eq!(
            parse("a if c else b"),
            Expression::Conditional {
                condition: Box::new(name("c")),
                then: Box::new(name("a")),
                otherwise: Box::new(name("b")),
            }
        );
    }

    #[test]
    fn test_tuples_and_parens() {
        assert_eq!(parse("(1)"), int(1));
        assert_eq!(parse("(1,)"), Expression::Tuple(vec![int(1)]));
        assert_eq!(parse("()"), Expression::Tuple(vec![]));
        assert_eq!(parse("1, 2"), Expression::Tuple(vec![int(1), int(2)]));
    }

    #[test]
    fn test_call_with_keyword_arguments() {
        assert_eq!(
            parse("f(1, sep='-')"),
            Expression::Call {
                function: Box::new(name("f")),
                arguments: vec![
                    Argument::Positional(int(1)),
                    Argument::Keyword(
                        "sep".to_string(),
                        Expression::Constant(Constant::Str("-".to_string()))
                    ),
                ],
            }
        );
    }

    #[test]
    fn test_positional_after_keyword_is_rejected() {
        let input = tokens("f(a=1, 2)");
        let (pos, _) = parse_expression().parse(&input, 0).unwrap();
        // The call trailer is rejected, leaving just the name.
        assert_eq!(pos, 1);
    }

    #[test]
    fn test_subscripts_and_slices() {
        assert_eq!(
            parse("xs[1:]"),
            Expression::Subscript {
                value: Box::new(name("xs")),
                index: Box::new(Index::Slice {
                    lower: Some(int(1)),
                    upper: None,
                    step: None,
                }),
            }
        );
        assert_eq!(
            parse("xs[::2]"),
            Expression::Subscript {
                value: Box::new(name("xs")),
                index: Box::new(Index::Slice {
                    lower: None,
                    upper: None,
                    step: Some(int(2)),
                }),
            }
        );
        assert_eq!(
            parse("d['k'].upper()"),
            Expression::Call {
                function: Box::new(Expression::Attribute {
                    value: Box::new(Expression::Subscript {
                        value: Box::new(name("d")),
                        index: Box::new(Index::Single(Expression::Constant(Constant::Str(
                            "k".to_string()
                        )))),
                    }),
                    name: "upper".to_string(),
                }),
                arguments: vec![],
            }
        );
    }

    #[test]
    fn test_list_comprehension() {
        let parsed = parse("[x * 2 for x in xs if x > 0]");
        let Expression::ListComp { element, generators } = parsed else {
            panic!("expected a comprehension, got {:?}", parsed);
        };
        assert_eq!(*element, binary(BinaryOperator::Multiply, name("x"), int(2)));
        assert_eq!(generators.len(), 1);
        assert_eq!(generators[0].target, Target::Name("x".to_string()));
        assert!(generators[0].condition.is_some());
    }

    #[test]
    fn test_generator_argument() {
        let parsed = parse("sum(x for x in range(3))");
        let Expression::Call { arguments, .. } = parsed else {
            panic!("expected a call");
        };
        assert!(matches!(
            arguments[0],
            Argument::Positional(Expression::ListComp { .. })
        ));
    }

    #[test]
    fn test_dict_display() {
        assert_eq!(
            parse("{'a': 1, 'b': 2}"),
            Expression::Dict(vec![
                (Expression::Constant(Constant::Str("a".to_string())), int(1)),
                (Expression::Constant(Constant::Str("b".to_string())), int(2)),
            ])
        );
        assert_eq!(parse("{}"), Expression::Dict(vec![]));
    }

    #[test]
    fn test_lambda() {
        assert_eq!(
            parse("lambda a, b=2: a + b"),
            Expression::Lambda {
                params: vec![
                    Parameter {
                        name: "a".to_string(),
                        default: None,
                    },
                    Parameter {
                        name: "b".to_string(),
                        default: Some(int(2)),
                    },
                ],
                body: Box::new(binary(BinaryOperator::Add, name("a"), name("b"))),
            }
        );
    }

    #[test]
    fn test_string_concatenation_and_fstrings() {
        assert_eq!(
            parse("'a' 'b'"),
            Expression::Constant(Constant::Str("ab".to_string()))
        );
        assert_eq!(
            parse("f'x={x + 1:>4}!'"),
            Expression::FString(vec![
                FStringPart::Text("x=".to_string()),
                FStringPart::Field {
                    expression: Box::new(binary(BinaryOperator::Add, name("x"), int(1))),
                    conversion: None,
                    format_spec: Some(">4".to_string()),
                },
                FStringPart::Text("!".to_string()),
            ])
        );
    }

    #[test]
    fn test_default_ordering_is_checked() {
        let input = tokens("lambda a=1, b: a");
        assert!(parse_expression().parse(&input, 0).is_err());
    }
}
