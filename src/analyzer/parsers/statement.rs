use super::{common::*, expression::*};
use crate::{
    analyzer::{prelude::*, Parser},
    ast::{BinaryOperator, Expression, IfBranch, Parameter, Statement, Target},
    tokenizer::{
        keyword::Keyword,
        symbol::{Delimiter, Operator},
        token::Token,
    },
};

const AUGMENTED_OPERATORS: &[(Operator, BinaryOperator)] = &[
    (Operator::PlusAssign, BinaryOperator::Add),
    (Operator::MinusAssign, BinaryOperator::Subtract),
    (Operator::MultiplyAssign, BinaryOperator::Multiply),
    (Operator::DivideAssign, BinaryOperator::Divide),
    (Operator::FloorDivideAssign, BinaryOperator::FloorDivide),
    (Operator::ModuloAssign, BinaryOperator::Modulo),
    (Operator::PowerAssign, BinaryOperator::Power),
];

fn statement() -> Box<dyn Parser<Token, Vec<Statement>>> {
    Box::new(lazy(parse_statement))
}

fn block() -> Box<dyn Parser<Token, Vec<Statement>>> {
    Box::new(lazy(parse_block))
}

/// One logical statement. Simple statements joined by `;` come back together.
pub fn parse_statement() -> impl Parser<Token, Vec<Statement>> {
    with_context(
        choice(vec![
            Box::new(map(parse_compound_statement(), |statement| vec![statement])),
            Box::new(parse_simple_statements()),
        ]),
        "statement",
    )
}

/// The body after a `:`, either an indented suite or statements on the same
/// line.
pub fn parse_block() -> impl Parser<Token, Vec<Statement>> {
    choice(vec![
        Box::new(preceded(
            newline(),
            delimited(
                indent(),
                map(many1(statement()), |groups: Vec<Vec<Statement>>| {
                    groups.into_iter().flatten().collect::<Vec<_>>()
                }),
                dedent(),
            ),
        )),
        Box::new(parse_simple_statements()),
    ])
}

fn parse_simple_statements() -> impl Parser<Token, Vec<Statement>> {
    map(
        tuple3(
            parse_simple_statement(),
            many(preceded(
                delimiter(Delimiter::Semicolon),
                parse_simple_statement(),
            )),
            preceded(optional(delimiter(Delimiter::Semicolon)), newline()),
        ),
        |(first, rest, ()): (Statement, Vec<Statement>, ())| {
            std::iter::once(first).chain(rest).collect()
        },
    )
}

fn parse_simple_statement() -> impl Parser<Token, Statement> {
    choice(vec![
        Box::new(map(keyword(Keyword::Pass), |_| Statement::Pass)),
        Box::new(map(keyword(Keyword::Break), |_| Statement::Break)),
        Box::new(map(keyword(Keyword::Continue), |_| Statement::Continue)),
        Box::new(map(
            preceded(keyword(Keyword::Return), optional(parse_expression_list())),
            Statement::Return,
        )),
        Box::new(map(
            preceded(keyword(Keyword::Global), identifier_list()),
            Statement::Global,
        )),
        Box::new(parse_import()),
        Box::new(parse_del()),
        Box::new(map(
            preceded(
                keyword(Keyword::Assert),
                tuple2(expression(), optional(preceded(comma(), expression()))),
            ),
            |(condition, message)| Statement::Assert { condition, message },
        )),
        Box::new(map(
            preceded(keyword(Keyword::Raise), optional(expression())),
            Statement::Raise,
        )),
        Box::new(parse_expression_statement()),
    ])
}

fn parse_import() -> impl Parser<Token, Statement> {
    let alias = || optional(preceded(keyword(Keyword::As), identifier()));
    choice(vec![
        Box::new(try_map(
            preceded(
                keyword(Keyword::Import),
                separated_list(terminated(dotted_name(), alias()), comma()),
            ),
            |(modules, _): (Vec<String>, bool)| {
                if modules.is_empty() {
                    Err("invalid syntax".to_string())
                } else {
                    Ok(Statement::Import(modules))
                }
            },
        )),
        Box::new(map(
            tuple3(
                keyword(Keyword::From),
                dotted_name(),
                preceded(
                    keyword(Keyword::Import),
                    choice(vec![
                        Box::new(operator(Operator::Multiply)),
                        Box::new(map(
                            separated_list(terminated(identifier(), alias()), comma()),
                            |_| (),
                        )),
                    ]),
                ),
            ),
            |((), module, ())| Statement::Import(vec![module]),
        )),
    ])
}

fn parse_del() -> impl Parser<Token, Statement> {
    try_map(
        preceded(
            keyword(Keyword::Del),
            separated_list(expression(), comma()),
        ),
        |(items, _): (Vec<Expression>, bool)| {
            if items.is_empty() {
                return Err("invalid syntax".to_string());
            }
            items
                .into_iter()
                .map(|item| {
                    Target::from_expression(item)
                        .ok_or_else(|| "cannot delete expression".to_string())
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Statement::Delete)
        },
    )
}

enum AssignTail {
    Assign(Vec<Expression>),
    Augmented(BinaryOperator, Expression),
    Annotated(Option<Expression>),
}

/// Expression statements, plain and chained assignment, augmented assignment
/// and annotated assignment (the annotation itself is discarded).
fn parse_expression_statement() -> impl Parser<Token, Statement> {
    try_map(
        tuple2(
            parse_expression_list(),
            optional(choice(vec![
                Box::new(map(
                    many1(preceded(operator(Operator::Assign), parse_expression_list())),
                    AssignTail::Assign,
                )),
                Box::new(map(
                    tuple2(operator_of(AUGMENTED_OPERATORS), parse_expression_list()),
                    |(op, value)| AssignTail::Augmented(op, value),
                )),
                Box::new(map(
                    preceded(
                        colon(),
                        preceded(
                            expression(),
                            optional(preceded(operator(Operator::Assign), parse_expression_list())),
                        ),
                    ),
                    AssignTail::Annotated,
                )),
            ])),
        ),
        |(head, tail)| build_assignment(head, tail),
    )
}

fn assignment_target(expression: Expression) -> Result<Target, String> {
    Target::from_expression(expression).ok_or_else(|| "cannot assign to expression".to_string())
}

fn build_assignment(head: Expression, tail: Option<AssignTail>) -> Result<Statement, String> {
    match tail {
        None => Ok(Statement::Expression(head)),
        Some(AssignTail::Assign(mut values)) => {
            let value = values
                .pop()
                .ok_or_else(|| "invalid syntax".to_string())?;
            let targets = std::iter::once(head)
                .chain(values)
                .map(assignment_target)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Statement::Assign { targets, value })
        }
        Some(AssignTail::Augmented(op, value)) => match assignment_target(head)? {
            Target::Tuple(_) => {
                Err("illegal expression for augmented assignment".to_string())
            }
            target => Ok(Statement::AugAssign { target, op, value }),
        },
        Some(AssignTail::Annotated(value)) => {
            let target = match assignment_target(head)? {
                Target::Tuple(_) => {
                    return Err("only single target can be annotated".to_string())
                }
                target => target,
            };
            Ok(match value {
                Some(value) => Statement::Assign {
                    targets: vec![target],
                    value,
                },
                None => Statement::Pass,
            })
        }
    }
}

fn parse_compound_statement() -> impl Parser<Token, Statement> {
    choice(vec![
        Box::new(parse_if()),
        Box::new(parse_while()),
        Box::new(parse_for()),
        Box::new(parse_function_def()),
    ])
}

fn parse_if() -> impl Parser<Token, Statement> {
    map(
        tuple3(
            tuple4(keyword(Keyword::If), expression(), colon(), block()),
            many(tuple4(keyword(Keyword::Elif), expression(), colon(), block())),
            optional(preceded(tuple2(keyword(Keyword::Else), colon()), block())),
        ),
        |(((), condition, (), body), elifs, otherwise): (
            ((), Expression, (), Vec<Statement>),
            Vec<((), Expression, (), Vec<Statement>)>,
            Option<Vec<Statement>>,
        )| {
            let mut branches = vec![IfBranch { condition, body }];
            branches.extend(
                elifs
                    .into_iter()
                    .map(|((), condition, (), body)| IfBranch { condition, body }),
            );
            Statement::If {
                branches,
                otherwise,
            }
        },
    )
}

fn parse_while() -> impl Parser<Token, Statement> {
    map(
        tuple4(keyword(Keyword::While), expression(), colon(), block()),
        |((), condition, (), body)| Statement::While { condition, body },
    )
}

fn parse_for() -> impl Parser<Token, Statement> {
    map(
        tuple4(
            keyword(Keyword::For),
            parse_target_list(),
            keyword(Keyword::In),
            tuple3(parse_expression_list(), colon(), block()),
        ),
        |((), target, (), (iter, (), body))| Statement::For { target, iter, body },
    )
}

/// `name`, `name: annotation`, `name=default` or `name: annotation = default`.
fn parse_typed_parameter() -> impl Parser<Token, Parameter> {
    map(
        tuple3(
            identifier(),
            optional(preceded(colon(), expression())),
            optional(preceded(operator(Operator::Assign), expression())),
        ),
        |(name, _, default)| Parameter { name, default },
    )
}

fn parse_function_def() -> impl Parser<Token, Statement> {
    map(
        tuple4(
            keyword(Keyword::Def),
            identifier(),
            delimited(
                delimiter(Delimiter::OpenParen),
                try_map(
                    separated_list(parse_typed_parameter(), comma()),
                    |(params, _): (Vec<Parameter>, bool)| validate_parameters(params),
                ),
                delimiter(Delimiter::CloseParen),
            ),
            preceded(
                optional(preceded(operator(Operator::ThinArrow), expression())),
                preceded(colon(), block()),
            ),
        ),
        |((), name, params, body)| Statement::FunctionDef { name, params, body },
    )
}
