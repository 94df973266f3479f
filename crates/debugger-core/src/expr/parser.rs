//! Tokenizer and precedence-climbing parser for break conditions.

use std::fmt;

/// Binary operators, weakest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub(crate) const fn precedence(self) -> u8 {
        match self {
            Self::Or | Self::And => 1,
            Self::Eq | Self::Ne => 2,
            Self::Lt | Self::Gt | Self::Le | Self::Ge => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div => 5,
            Self::Pow => 6,
        }
    }

    /// Exponentiation chains to the right; everything else to the left.
    pub(crate) const fn is_right_associative(self) -> bool {
        matches!(self, Self::Pow)
    }

    pub(crate) const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "OR",
            Self::And => "AND",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    LParen,
    RParen,
    Op(BinaryOp),
    Term(String),
}

/// Parsed condition tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr {
    Term(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Structural failure; surfaced to the host as one generic message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("unexpected character {0:?}")]
    UnexpectedCharacter(char),
    #[error("unexpected end of condition")]
    UnexpectedEnd,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unbalanced parentheses")]
    UnbalancedParens,
}

/// Splits a condition into tokens.
///
/// Terms are runs of alphanumeric characters; parentheses never need
/// surrounding whitespace, operators and terms do when adjacent tokens
/// would otherwise merge.
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Op(BinaryOp::Add));
            }
            '-' => {
                chars.next();
                tokens.push(Token::Op(BinaryOp::Sub));
            }
            '*' => {
                chars.next();
                tokens.push(Token::Op(BinaryOp::Mul));
            }
            '/' => {
                chars.next();
                tokens.push(Token::Op(BinaryOp::Div));
            }
            '^' => {
                chars.next();
                tokens.push(Token::Op(BinaryOp::Pow));
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(BinaryOp::Eq));
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Op(BinaryOp::Ne)),
                    _ => return Err(ParseError::UnexpectedCharacter('!')),
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(BinaryOp::Le));
                } else {
                    tokens.push(Token::Op(BinaryOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(BinaryOp::Ge));
                } else {
                    tokens.push(Token::Op(BinaryOp::Gt));
                }
            }
            c if c.is_ascii_alphanumeric() => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if word.eq_ignore_ascii_case("and") {
                    tokens.push(Token::Op(BinaryOp::And));
                } else if word.eq_ignore_ascii_case("or") {
                    tokens.push(Token::Op(BinaryOp::Or));
                } else {
                    tokens.push(Token::Term(word));
                }
            }
            other => return Err(ParseError::UnexpectedCharacter(other)),
        }
    }

    Ok(tokens)
}

/// Checks that terms and operators strictly alternate, ignoring
/// parentheses: the token stream must start and end with a term and never
/// put two terms or two operators side by side.
pub(crate) fn alternates(tokens: &[Token]) -> bool {
    let mut expect_term = true;
    for token in tokens {
        match token {
            Token::LParen | Token::RParen => {}
            Token::Term(_) => {
                if !expect_term {
                    return false;
                }
                expect_term = false;
            }
            Token::Op(_) => {
                if expect_term {
                    return false;
                }
                expect_term = true;
            }
        }
    }
    !expect_term
}

/// Parses a token stream into an expression tree.
pub(crate) fn parse(tokens: &[Token]) -> Result<Expr, ParseError> {
    let mut parser = Parser { tokens, index: 0 };
    let expr = parser.expression(0)?;
    if parser.index != tokens.len() {
        return Err(ParseError::UnexpectedToken);
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.primary()?;
        while let Some(&Token::Op(op)) = self.peek() {
            if op.precedence() < min_precedence {
                break;
            }
            self.index += 1;
            let next_min = if op.is_right_associative() {
                op.precedence()
            } else {
                op.precedence() + 1
            };
            let rhs = self.expression(next_min)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Term(term)) => {
                let expr = Expr::Term(term.clone());
                self.index += 1;
                Ok(expr)
            }
            Some(Token::LParen) => {
                self.index += 1;
                let expr = self.expression(0)?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.index += 1;
                        Ok(expr)
                    }
                    _ => Err(ParseError::UnbalancedParens),
                }
            }
            Some(_) => Err(ParseError::UnexpectedToken),
            None => Err(ParseError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{alternates, parse, tokenize, BinaryOp, Expr, ParseError, Token};

    fn term(name: &str) -> Box<Expr> {
        Box::new(Expr::Term(name.to_owned()))
    }

    #[test]
    fn tokenizes_words_operators_and_parens() {
        let tokens = tokenize("(RAX + 1F) >= rbx AND ZF = 1").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LParen,
                Token::Term("RAX".to_owned()),
                Token::Op(BinaryOp::Add),
                Token::Term("1F".to_owned()),
                Token::RParen,
                Token::Op(BinaryOp::Ge),
                Token::Term("rbx".to_owned()),
                Token::Op(BinaryOp::And),
                Token::Term("ZF".to_owned()),
                Token::Op(BinaryOp::Eq),
                Token::Term("1".to_owned()),
            ]
        );
    }

    #[test]
    fn rejects_stray_characters() {
        assert_eq!(
            tokenize("RAX & 1"),
            Err(ParseError::UnexpectedCharacter('&'))
        );
        assert_eq!(
            tokenize("RAX ! 1"),
            Err(ParseError::UnexpectedCharacter('!'))
        );
    }

    #[test]
    fn alternation_requires_term_op_term() {
        assert!(alternates(&tokenize("RAX = 1").unwrap()));
        assert!(alternates(&tokenize("(RAX + 1) = RBX").unwrap()));
        assert!(!alternates(&tokenize("RAX + + RBX").unwrap()));
        assert!(!alternates(&tokenize("RAX RBX").unwrap()));
        assert!(!alternates(&tokenize("= RAX").unwrap()));
        assert!(!alternates(&tokenize("RAX =").unwrap()));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse(&tokenize("1 + 2 * 3").unwrap()).unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: term("1"),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: term("2"),
                    rhs: term("3"),
                }),
            }
        );
    }

    #[test]
    fn exponentiation_chains_to_the_right() {
        let expr = parse(&tokenize("2 ^ 3 ^ 2").unwrap()).unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Pow,
                lhs: term("2"),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    lhs: term("3"),
                    rhs: term("2"),
                }),
            }
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse(&tokenize("(1 + 2) * 3").unwrap()).unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(Expr::Binary {
                    op: BinaryOp::Add,
                    lhs: term("1"),
                    rhs: term("2"),
                }),
                rhs: term("3"),
            }
        );
    }

    #[test]
    fn comparisons_bind_tighter_than_logic() {
        let expr = parse(&tokenize("RAX = 1 AND RBX = 2").unwrap()).unwrap();
        let Expr::Binary { op, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::And);
    }

    #[test]
    fn dangling_operator_fails_to_parse() {
        assert!(parse(&tokenize("RAX =").unwrap()).is_err());
        assert!(parse(&tokenize("(RAX = 1").unwrap()).is_err());
    }
}
