//! Parser for the core description language.

use super::ast::*;
use super::lexer::{parse_value, Lexer, Token, TokenKind};
use crate::error::{PhsError, Result};
use crate::symbolic::{Expr, Func};

/// Recursive-descent parser; expressions use precedence climbing.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    /// Parse the entire description.
    pub fn parse(&mut self) -> Result<CoreAst> {
        let mut ast = CoreAst::new();

        while self.current.kind != TokenKind::Eof {
            match self.current.kind {
                TokenKind::Newline => {
                    self.advance()?;
                    continue;
                }
                TokenKind::Directive => self.parse_directive(&mut ast)?,
                _ => {
                    return Err(PhsError::parse(
                        self.current.line,
                        format!("expected a directive, got {:?}", self.current.text),
                    ));
                }
            }
            self.end_of_line()?;
        }

        Ok(ast)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(PhsError::parse(
                self.current.line,
                format!("expected {:?}, got {:?}", kind, self.current.kind),
            ))
        }
    }

    fn end_of_line(&mut self) -> Result<()> {
        match self.current.kind {
            TokenKind::Newline => self.advance(),
            TokenKind::Eof => Ok(()),
            _ => Err(PhsError::parse(
                self.current.line,
                format!("unexpected trailing token {:?}", self.current.text),
            )),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn name(&mut self) -> Result<String> {
        Ok(self.expect(TokenKind::Identifier)?.text)
    }

    fn parse_directive(&mut self, ast: &mut CoreAst) -> Result<()> {
        let directive = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        match directive.to_lowercase().as_str() {
            ".label" => {
                ast.label = Some(self.name()?);
            }
            ".const" => {
                let name = self.name()?;
                let expr = self.parse_expr()?;
                let value = expr
                    .as_num()
                    .ok_or_else(|| PhsError::parse(line, format!("constant '{}' is not numeric: {}", name, expr)))?;
                ast.constants.push(ConstDef { name, value, line });
            }
            ".param" => {
                let name = self.name()?;
                ast.parameters.push(ParamDef { name, line });
            }
            ".storage" => {
                let name = self.name()?;
                self.expect(TokenKind::Equals)?;
                let hamiltonian = self.parse_expr()?;
                ast.storages.push(StorageDef {
                    name,
                    hamiltonian,
                    line,
                });
            }
            ".dissip" => {
                let name = self.name()?;
                self.expect(TokenKind::Equals)?;
                let law = self.parse_expr()?;
                ast.dissipations.push(DissipationDef { name, law, line });
            }
            ".port" => {
                let input = self.name()?;
                let output = self.name()?;
                ast.ports.push(PortDef { input, output, line });
            }
            ".connect" => {
                let from = self.name()?;
                let to = self.name()?;
                let coef = if self.at_line_end() {
                    Expr::one()
                } else {
                    self.parse_expr()?
                };
                ast.connections.push(ConnectionDef { from, to, coef, line });
            }
            ".entry" => {
                let row = self.name()?;
                let col = self.name()?;
                let value = self.parse_expr()?;
                ast.entries.push(EntryDef { row, col, value, line });
            }
            _ => {
                return Err(PhsError::parse(line, format!("unknown directive: {}", directive)));
            }
        }

        Ok(())
    }

    /// expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            match self.current.kind {
                TokenKind::Plus => {
                    self.advance()?;
                    lhs = lhs + self.parse_term()?;
                }
                TokenKind::Minus => {
                    self.advance()?;
                    lhs = lhs - self.parse_term()?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    /// term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.current.kind {
                TokenKind::Star => {
                    self.advance()?;
                    lhs = lhs * self.parse_unary()?;
                }
                TokenKind::Slash => {
                    self.advance()?;
                    lhs = lhs / self.parse_unary()?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    /// unary := ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.current.kind {
            TokenKind::Minus => {
                self.advance()?;
                Ok(-self.parse_unary()?)
            }
            TokenKind::Plus => {
                self.advance()?;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// power := primary ('^' unary)?, right associative
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if self.current.kind == TokenKind::Caret {
            self.advance()?;
            let exp = self.parse_unary()?;
            return Ok(Expr::power(base, exp));
        }
        Ok(base)
    }

    /// primary := number | name | name '(' expr ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Number => {
                self.advance()?;
                let v = parse_value(&tok.text)
                    .ok_or_else(|| PhsError::parse(tok.line, format!("invalid number: {}", tok.text)))?;
                Ok(Expr::num(v))
            }
            TokenKind::Identifier => {
                self.advance()?;
                if self.current.kind != TokenKind::OpenParen {
                    return Ok(Expr::var(&tok.text));
                }
                let func = Func::from_name(&tok.text)
                    .ok_or_else(|| PhsError::parse(tok.line, format!("unknown function: {}", tok.text)))?;
                self.advance()?;
                let arg = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(Expr::call(func, arg))
            }
            TokenKind::OpenParen => {
                self.advance()?;
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            _ => Err(PhsError::parse(
                tok.line,
                format!("expected an expression, got {:?}", tok.text),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    use crate::symbolic::Symbol;

    fn expr(src: &str) -> Expr {
        let ast = super::super::parse(&format!(".entry a b {}", src)).unwrap();
        ast.entries[0].value.clone()
    }

    fn at(e: &Expr, vals: &[(&str, f64)]) -> f64 {
        let map: BTreeMap<Symbol, f64> = vals.iter().map(|(n, v)| (Symbol::new(n), *v)).collect();
        e.subs_num(&map).as_num().unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_relative_eq!(at(&expr("1 + 2*3^2"), &[]), 19.0);
        assert_relative_eq!(at(&expr("-x^2"), &[("x", 3.0)]), -9.0);
        assert_relative_eq!(at(&expr("2^3^2"), &[]), 512.0);
        assert_relative_eq!(at(&expr("(1 + x)/2 - x"), &[("x", 3.0)]), -1.0);
        assert_relative_eq!(at(&expr("8/2/2"), &[]), 2.0);
    }

    #[test]
    fn test_function_calls_and_suffixes() {
        assert_relative_eq!(at(&expr("tanh(x)*10k"), &[("x", 0.5)]), 0.5f64.tanh() * 1e4);
        assert_relative_eq!(at(&expr("sqrt(4) + 100n"), &[]), 2.0 + 100e-9);
    }

    #[test]
    fn test_parse_full_description() {
        let input = "\
# series RLC driven by a voltage source
.label rlc
.const C 100n
.const L 2*5m
.param r0
.storage q = q^2/(2*C)
.storage phi = phi^2/(2*L)
.dissip wr = r0*wr
.port vin iin
.connect q phi
.connect phi wr
.connect phi vin -1
.entry wr wr 0
";
        let ast = super::super::parse(input).unwrap();
        assert_eq!(ast.label.as_deref(), Some("rlc"));
        assert_eq!(ast.constants.len(), 2);
        assert_relative_eq!(ast.constants[1].value, 0.01, epsilon = 1e-15);
        assert_eq!(ast.parameters[0].name, "r0");
        assert_eq!(ast.storages.len(), 2);
        assert_eq!(ast.storages[1].line, 7);
        assert_eq!(ast.ports[0].output, "iin");
        assert_eq!(ast.connections[0].coef, Expr::one());
        assert_eq!(ast.connections[2].coef, Expr::num(-1.0));
        assert_eq!(ast.entries.len(), 1);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(super::super::parse(".bogus x"), Err(PhsError::ParseError { .. })));
        assert!(matches!(super::super::parse("q = 1"), Err(PhsError::ParseError { .. })));
        assert!(matches!(
            super::super::parse(".storage q = frobnicate(q)"),
            Err(PhsError::ParseError { .. })
        ));
        assert!(matches!(super::super::parse(".const k x"), Err(PhsError::ParseError { .. })));
        assert!(matches!(
            super::super::parse(".storage q = (q"),
            Err(PhsError::ParseError { line: 1, .. })
        ));
        assert!(matches!(super::super::parse(".param g h"), Err(PhsError::ParseError { .. })));
    }
}
