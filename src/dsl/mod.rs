//! Text description language for port-Hamiltonian cores.
//!
//! The language is line-oriented: every non-empty line is a directive.
//!
//! # Grammar Overview
//!
//! ```text
//! core        = { line }
//! line        = comment | directive | empty
//! comment     = ('#' | ';') { any_char }
//! directive   = ".label"   name
//!             | ".const"   name expr
//!             | ".param"   name
//!             | ".storage" name '=' expr
//!             | ".dissip"  name '=' expr
//!             | ".port"    name name
//!             | ".connect" name name [expr]
//!             | ".entry"   name name expr
//!
//! expr        = term { ('+' | '-') term }
//! term        = unary { ('*' | '/') unary }
//! unary       = ('-' | '+') unary | power
//! power       = primary [ '^' unary ]
//! primary     = number | name | name '(' expr ')' | '(' expr ')'
//!
//! number      = digit+ ['.' digit*] [('e'|'E') ['-'|'+'] digit+] [unit_suffix]
//! unit_suffix = 'p' | 'n' | 'u' | 'm' | 'k' | 'M' | 'G'
//! name        = (letter | '_') { letter | digit | '_' }
//! ```
//!
//! # Directives
//!
//! | Directive | Meaning |
//! |-----------|---------|
//! | `.storage q = H` | state `q`, adds `H` to the storage function |
//! | `.dissip w = z` | dissipation variable `w` with law `z(w)` |
//! | `.port u y` | external port with input `u` and output `y` |
//! | `.param g` | runtime parameter |
//! | `.const C 100n` | constant substituted before evaluation |
//! | `.connect a b [c]` | `M[a,b] = c`, `M[b,a] = -c` (default `c = 1`) |
//! | `.entry a b e` | single structure-matrix entry `M[a,b] = e` |
//!
//! # Example
//!
//! ```text
//! # Series RLC driven by a voltage source
//! .const C 100n
//! .const L 10m
//! .const R 1k
//! .storage q = q^2/(2*C)
//! .storage phi = phi^2/(2*L)
//! .dissip wr = R*wr
//! .port vin iin
//! .connect q phi
//! .connect phi wr
//! .connect phi vin
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::*;
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;

use crate::error::Result;

/// Parse a core description string into an AST.
pub fn parse(input: &str) -> Result<CoreAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse()
}

/// Parse a core description file.
pub fn parse_file(path: &std::path::Path) -> Result<CoreAst> {
    let content = std::fs::read_to_string(path).map_err(|e| crate::error::PhsError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    parse(&content)
}
