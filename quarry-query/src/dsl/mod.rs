//! The query language: grammar, syntax tree and parser.

pub mod ast;
mod parser;

pub use ast::*;
pub use parser::{parse_condition, parse_program, parse_statement};
