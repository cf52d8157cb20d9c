pub mod ast;
pub mod conditional;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;
pub mod redirect;

pub use lexer::tokenize;
pub use parser::split;
