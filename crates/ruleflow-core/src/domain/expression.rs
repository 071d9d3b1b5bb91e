//! Condition expressions for CONDITIONAL connections
//!
//! Expressions are parsed once when a flow graph is compiled and evaluated
//! against an [`ExecutionContext`] each time the owning edge is considered.
//! Evaluation is total: an identifier that cannot be resolved makes the whole
//! expression false instead of raising.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use super::context::ExecutionContext;
use crate::CoreError;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),
    /// Dotted identifier resolved against the context
    Ident(String),
    /// Logical negation
    Not(Box<Expr>),
    /// Logical conjunction
    And(Box<Expr>, Box<Expr>),
    /// Logical disjunction
    Or(Box<Expr>, Box<Expr>),
    /// Comparison
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Op(CompareOp),
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>, CoreError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |msg: String| CoreError::ValidationError(format!("{} in expression '{}'", msg, source));

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(error(format!("expected '{}{}'", c, c)));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let token = match (c, next_is_eq) {
                    ('=', true) => Token::Op(CompareOp::Eq),
                    ('!', true) => Token::Op(CompareOp::Ne),
                    ('<', true) => Token::Op(CompareOp::Le),
                    ('>', true) => Token::Op(CompareOp::Ge),
                    ('<', false) => Token::Op(CompareOp::Lt),
                    ('>', false) => Token::Op(CompareOp::Gt),
                    ('!', false) => Token::Not,
                    _ => return Err(error("single '=' is not an operator".to_string())),
                };
                i += if next_is_eq { 2 } else { 1 };
                tokens.push(token);
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => break,
                        Some('\\') => {
                            if let Some(&escaped) = chars.get(i + 1) {
                                text.push(escaped);
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => return Err(error("unterminated string".to_string())),
                    }
                }
                i += 1;
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| error(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(error(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<Expr, CoreError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, CoreError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, CoreError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CoreError> {
        let left = self.primary()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.advance();
            let right = self.primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, CoreError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            )),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let inner = self.or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(CoreError::ValidationError("expected ')'".to_string())),
                }
            }
            Some(other) => Err(CoreError::ValidationError(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(CoreError::ValidationError(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}

/// Marker for an identifier that could not be resolved
struct Unresolved;

impl Expr {
    /// Parse an expression; malformed input is a `ValidationError`
    pub fn parse(source: &str) -> Result<Expr, CoreError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(CoreError::ValidationError("empty expression".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or().map_err(|e| match e {
            CoreError::ValidationError(msg) => {
                CoreError::ValidationError(format!("{} in expression '{}'", msg, source))
            }
            other => other,
        })?;
        if parser.pos < parser.tokens.len() {
            return Err(CoreError::ValidationError(format!(
                "trailing input in expression '{}'",
                source
            )));
        }
        Ok(expr)
    }

    /// Evaluate against a context; unresolved identifiers yield `false`
    pub fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        match self.eval(ctx) {
            Ok(value) => truthy(&value),
            Err(Unresolved) => false,
        }
    }

    fn eval(&self, ctx: &ExecutionContext) -> Result<Value, Unresolved> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => ctx.resolve_identifier(name).cloned().ok_or(Unresolved),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(ctx)?))),
            Expr::And(left, right) => {
                let l = left.eval(ctx);
                let r = right.eval(ctx);
                Ok(Value::Bool(truthy(&l?) && truthy(&r?)))
            }
            Expr::Or(left, right) => {
                let l = left.eval(ctx);
                let r = right.eval(ctx);
                Ok(Value::Bool(truthy(&l?) || truthy(&r?)))
            }
            Expr::Compare(left, op, right) => {
                let l = left.eval(ctx)?;
                let r = right.eval(ctx)?;
                Ok(Value::Bool(compare(&l, *op, &r)))
            }
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };

    match (op, ordering) {
        (CompareOp::Eq, ordering) => ordering == Some(Ordering::Equal),
        (CompareOp::Ne, ordering) => ordering != Some(Ordering::Equal),
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        (_, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(json!({"amount": 50}).as_object().cloned().unwrap_or_default());
        ctx.set_variable("postal_code_exists", json!(true));
        ctx.set_variable("province", json!("ON"));
        ctx.set_output("total_tax", json!(13.0));
        ctx
    }

    #[test]
    fn test_comparisons_and_logic() {
        let ctx = context();
        let cases = [
            ("postal_code_exists == true", true),
            ("province == 'ON' && total_tax > 10", true),
            ("province != \"ON\"", false),
            ("total_tax >= 13 and not (province == 'QC')", true),
            ("total_tax < 13 || province == 'BC'", false),
            ("Output.total_tax == 13", true),
            ("Variables.total_tax == 13", false),
            ("Input.amount <= 50", true),
            ("!postal_code_exists", false),
        ];

        for (source, expected) in cases {
            let expr = Expr::parse(source).unwrap();
            assert_eq!(expr.evaluate(&ctx), expected, "expression: {}", source);
        }
    }

    #[test]
    fn test_unknown_identifier_makes_expression_false() {
        let ctx = context();
        for source in [
            "missing == 1",
            "missing != 1",
            "!missing",
            "postal_code_exists || missing == 2",
            "not (missing == 1)",
        ] {
            let expr = Expr::parse(source).unwrap();
            assert!(!expr.evaluate(&ctx), "expression: {}", source);
        }
    }

    #[test]
    fn test_malformed_expressions_fail_to_parse() {
        for source in ["", "a ==", "(a == 1", "a = 1", "a == 'open", "a & b", "a == 1 b"] {
            assert!(
                matches!(Expr::parse(source), Err(CoreError::ValidationError(_))),
                "expression should fail: {:?}",
                source
            );
        }
    }

    #[test]
    fn test_negative_numbers_and_precedence() {
        let expr = Expr::parse("a > -1 || b == 2 && c == 3").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("Expected Or at the root, got {:?}", other),
        }
    }
}
