//! Syntax tree for the script language.

use std::fmt;

use strum::{AsRefStr, Display};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "**")]
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOperator {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "not")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BoolOperator {
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CompareOperator {
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
    #[strum(serialize = "is")]
    Is,
    #[strum(serialize = "is not")]
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Field {
        expression: Box<Expression>,
        conversion: Option<char>,
        format_spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expression),
    Keyword(String, Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Single(Expression),
    Slice {
        lower: Option<Expression>,
        upper: Option<Expression>,
        step: Option<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expression,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(Constant),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    ListComp {
        element: Box<Expression>,
        generators: Vec<Comprehension>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BoolOp {
        op: BoolOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Compare {
        left: Box<Expression>,
        comparisons: Vec<(CompareOperator, Expression)>,
    },
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    Lambda {
        params: Vec<Parameter>,
        body: Box<Expression>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Argument>,
    },
    Attribute {
        value: Box<Expression>,
        name: String,
    },
    Subscript {
        value: Box<Expression>,
        index: Box<Index>,
    },
}

/// Left-hand side of an assignment, a `for` loop or a `del`.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Tuple(Vec<Target>),
    Subscript { value: Expression, index: Index },
    Attribute { value: Expression, name: String },
}

impl Target {
    /// Rebuilds a target from an expression parsed on the left of `=`.
    pub fn from_expression(expression: Expression) -> Option<Target> {
        match expression {
            Expression::Name(name) => Some(Target::Name(name)),
            Expression::Tuple(items) | Expression::List(items) => items
                .into_iter()
                .map(Target::from_expression)
                .collect::<Option<Vec<_>>>()
                .map(Target::Tuple),
            Expression::Subscript { value, index } => Some(Target::Subscript {
                value: *value,
                index: *index,
            }),
            Expression::Attribute { value, name } => Some(Target::Attribute {
                value: *value,
                name,
            }),
            _ => None,
        }
    }

    /// Every plain name bound by this target.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Target::Name(name) => vec![name.as_str()],
            Target::Tuple(items) => items.iter().flat_map(Target::names).collect(),
            _ => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Assign {
        targets: Vec<Target>,
        value: Expression,
    },
    AugAssign {
        target: Target,
        op: BinaryOperator,
        value: Expression,
    },
    If {
        branches: Vec<IfBranch>,
        otherwise: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        target: Target,
        iter: Expression,
        body: Vec<Statement>,
    },
    FunctionDef {
        name: String,
        params: Vec<Parameter>,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    Pass,
    Break,
    Continue,
    Global(Vec<String>),
    Import(Vec<String>),
    Delete(Vec<Target>),
    Assert {
        condition: Expression,
        message: Option<Expression>,
    },
    Raise(Option<Expression>),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(name) => write!(f, "{}", name),
            Target::Tuple(items) => {
                let names: Vec<String> = items.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", names.join(", "))
            }
            Target::Subscript { .. } => write!(f, "<subscript>"),
            Target::Attribute { name, .. } => write!(f, "<attribute {}>", name),
        }
    }
}
