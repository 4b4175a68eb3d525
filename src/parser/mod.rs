//! Spokfile Lexing and Parsing
//!
//! The lexer streams tokens lazily; the parser consumes them with one token
//! of lookahead and produces the AST. `parse` is the one-shot entry point.

pub mod lexer;
pub mod parser;
pub mod token;

pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use token::{Token, TokenKind};

use crate::ast::Tree;

/// Parse spokfile source text into a syntax tree.
pub fn parse(input: &str) -> Result<Tree, ParseError> {
    Parser::new(input).parse()
}
