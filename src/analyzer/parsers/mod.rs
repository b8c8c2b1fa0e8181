pub mod common;
pub mod expression;
pub mod statement;

pub use expression::{parse_expression, parse_expression_list};
pub use statement::{parse_block, parse_statement};
