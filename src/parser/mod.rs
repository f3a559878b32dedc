// Filter expression parser module

pub mod filter;
pub mod lexer;

pub use filter::{parse_filter, parse_filter_expr};
