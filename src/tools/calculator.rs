//! Arithmetic evaluator for the calculator tool.
//!
//! The expression language is deliberately closed: numbers, the operators
//! `+ - * / % ^`, parentheses, a whitelist of math functions, the constants
//! `pi` and `e`, and the `X% of Y` percentage form. Anything else is
//! rejected before evaluation, so tool input is never interpreted as code.
//!
//! Integers stay integers through addition, subtraction, multiplication,
//! and exact division, so `45 * 67` prints `3015` rather than `3015.0`.
//! Function results are always floating point.

use crate::error::ToolError;

/// Evaluate an arithmetic expression and format the result.
pub fn evaluate(input: &str) -> Result<String, ToolError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ToolError::CalculationError("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ToolError::CalculationError(format!(
            "unexpected trailing input near '{}'",
            parser.tokens[parser.pos]
        )));
    }
    Ok(format_num(value))
}

/// Numeric value that keeps integer results exact where possible.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn format_num(value: Num) -> String {
    match value {
        Num::Int(i) => i.to_string(),
        Num::Float(f) => {
            if !f.is_finite() {
                f.to_string()
            } else if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{:.1}", f)
            } else {
                format!("{}", f)
            }
        }
    }
}

// ============ Tokenizer ============

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Num),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", format_num(*n)),
            Token::Ident(s) => f.write_str(s),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Caret => f.write_str("^"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

const FUNCTIONS: &[&str] = &["sqrt", "sin", "cos", "tan", "log", "ln", "exp", "abs"];

fn tokenize(input: &str) -> Result<Vec<Token>, ToolError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                // Accept ** as exponentiation alongside ^.
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut saw_dot = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        if saw_dot {
                            break;
                        }
                        saw_dot = true;
                    }
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let num = if saw_dot {
                    literal
                        .parse::<f64>()
                        .map(Num::Float)
                        .map_err(|_| bad_number(&literal))?
                } else {
                    literal
                        .parse::<i64>()
                        .map(Num::Int)
                        .map_err(|_| bad_number(&literal))?
                };
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let lower = word.to_ascii_lowercase();
                if lower == "of" || lower == "pi" || lower == "e" || FUNCTIONS.contains(&lower.as_str())
                {
                    tokens.push(Token::Ident(lower));
                } else {
                    return Err(ToolError::CalculationError(format!(
                        "unknown identifier '{}'",
                        word
                    )));
                }
            }
            other => {
                return Err(ToolError::CalculationError(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

fn bad_number(literal: &str) -> ToolError {
    ToolError::CalculationError(format!("invalid number '{}'", literal))
}

// ============ Parser / evaluator ============

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expr(&mut self) -> Result<Num, ToolError> {
        let mut left = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let right = self.term()?;
                    left = add(left, right)?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    let right = self.term()?;
                    left = sub(left, right)?;
                }
                _ => return Ok(left),
            }
        }
    }

    fn term(&mut self) -> Result<Num, ToolError> {
        let mut left = self.percent()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let right = self.percent()?;
                    left = mul(left, right)?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.percent()?;
                    left = div(left, right)?;
                }
                _ => return Ok(left),
            }
        }
    }

    /// Handles the `%` postfix: `X% of Y` is `(X * Y) / 100`, a bare `X%`
    /// is `X / 100`.
    fn percent(&mut self) -> Result<Num, ToolError> {
        let value = self.power()?;
        if self.peek() != Some(&Token::Percent) {
            return Ok(value);
        }
        self.advance();

        if self.peek() == Some(&Token::Ident("of".to_string())) {
            self.advance();
            let base = self.power()?;
            let product = mul(value, base)?;
            div(product, Num::Int(100))
        } else {
            div(value, Num::Int(100))
        }
    }

    fn power(&mut self) -> Result<Num, ToolError> {
        let base = self.unary()?;
        if self.peek() == Some(&Token::Caret) {
            self.advance();
            // Right associative.
            let exponent = self.power()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Num, ToolError> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            let value = self.unary()?;
            return match value {
                Num::Int(i) => i
                    .checked_neg()
                    .map(Num::Int)
                    .ok_or_else(|| overflow("negation")),
                Num::Float(f) => Ok(Num::Float(-f)),
            };
        }
        if self.peek() == Some(&Token::Plus) {
            self.advance();
            return self.unary();
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Num, ToolError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ToolError::CalculationError(
                        "missing closing parenthesis".to_string(),
                    )),
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "pi" => Ok(Num::Float(std::f64::consts::PI)),
                "e" => Ok(Num::Float(std::f64::consts::E)),
                func if FUNCTIONS.contains(&func) => {
                    if self.advance() != Some(Token::LParen) {
                        return Err(ToolError::CalculationError(format!(
                            "expected '(' after {}",
                            func
                        )));
                    }
                    let arg = self.expr()?;
                    if self.advance() != Some(Token::RParen) {
                        return Err(ToolError::CalculationError(format!(
                            "missing ')' after {} argument",
                            func
                        )));
                    }
                    apply_function(func, arg.as_f64())
                }
                other => Err(ToolError::CalculationError(format!(
                    "'{}' is not valid here",
                    other
                ))),
            },
            Some(tok) => Err(ToolError::CalculationError(format!(
                "unexpected '{}'",
                tok
            ))),
            None => Err(ToolError::CalculationError(
                "expression ended unexpectedly".to_string(),
            )),
        }
    }
}

fn apply_function(name: &str, arg: f64) -> Result<Num, ToolError> {
    let result = match name {
        "sqrt" => {
            if arg < 0.0 {
                return Err(ToolError::CalculationError(
                    "square root of a negative number".to_string(),
                ));
            }
            arg.sqrt()
        }
        "sin" => arg.sin(),
        "cos" => arg.cos(),
        "tan" => arg.tan(),
        "log" => {
            if arg <= 0.0 {
                return Err(ToolError::CalculationError(
                    "logarithm of a non-positive number".to_string(),
                ));
            }
            arg.log10()
        }
        "ln" => {
            if arg <= 0.0 {
                return Err(ToolError::CalculationError(
                    "logarithm of a non-positive number".to_string(),
                ));
            }
            arg.ln()
        }
        "exp" => arg.exp(),
        "abs" => arg.abs(),
        other => {
            return Err(ToolError::CalculationError(format!(
                "unknown function '{}'",
                other
            )));
        }
    };
    Ok(Num::Float(result))
}

fn overflow(op: &str) -> ToolError {
    ToolError::CalculationError(format!("integer overflow in {}", op))
}

fn add(a: Num, b: Num) -> Result<Num, ToolError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x
            .checked_add(y)
            .map(Num::Int)
            .ok_or_else(|| overflow("addition")),
        _ => Ok(Num::Float(a.as_f64() + b.as_f64())),
    }
}

fn sub(a: Num, b: Num) -> Result<Num, ToolError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x
            .checked_sub(y)
            .map(Num::Int)
            .ok_or_else(|| overflow("subtraction")),
        _ => Ok(Num::Float(a.as_f64() - b.as_f64())),
    }
}

fn mul(a: Num, b: Num) -> Result<Num, ToolError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x
            .checked_mul(y)
            .map(Num::Int)
            .ok_or_else(|| overflow("multiplication")),
        _ => Ok(Num::Float(a.as_f64() * b.as_f64())),
    }
}

/// Integer division stays exact when it divides evenly; otherwise the
/// result is floating point. Division by zero is an error, never infinity.
fn div(a: Num, b: Num) -> Result<Num, ToolError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            if y == 0 {
                return Err(ToolError::CalculationError("division by zero".to_string()));
            }
            if x % y == 0 {
                Ok(Num::Int(x / y))
            } else {
                Ok(Num::Float(x as f64 / y as f64))
            }
        }
        _ => {
            let denom = b.as_f64();
            if denom == 0.0 {
                return Err(ToolError::CalculationError("division by zero".to_string()));
            }
            Ok(Num::Float(a.as_f64() / denom))
        }
    }
}

fn pow(base: Num, exponent: Num) -> Result<Num, ToolError> {
    if let (Num::Int(b), Num::Int(e)) = (base, exponent) {
        if (0..=u32::MAX as i64).contains(&e) {
            if let Some(result) = b.checked_pow(e as u32) {
                return Ok(Num::Int(result));
            }
            return Err(overflow("exponentiation"));
        }
    }
    let result = base.as_f64().powf(exponent.as_f64());
    if result.is_nan() {
        return Err(ToolError::CalculationError(
            "exponentiation produced an undefined result".to_string(),
        ));
    }
    Ok(Num::Float(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_stays_integer() {
        assert_eq!(evaluate("45 * 67").unwrap(), "3015");
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), "14");
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), "20");
        assert_eq!(evaluate("10 / 2").unwrap(), "5");
    }

    #[test]
    fn inexact_division_goes_float() {
        assert_eq!(evaluate("7 / 2").unwrap(), "3.5");
    }

    #[test]
    fn percent_of() {
        assert_eq!(evaluate("15% of 2500").unwrap(), "375");
        assert_eq!(evaluate("50% of 7").unwrap(), "3.5");
        assert_eq!(evaluate("25%").unwrap(), "0.25");
    }

    #[test]
    fn functions_are_float() {
        assert_eq!(evaluate("sqrt(256)").unwrap(), "16.0");
        assert_eq!(evaluate("abs(-3)").unwrap(), "3.0");
        let cos = evaluate("cos(0)").unwrap();
        assert_eq!(cos, "1.0");
    }

    #[test]
    fn exponentiation() {
        assert_eq!(evaluate("2^10").unwrap(), "1024");
        assert_eq!(evaluate("2**3").unwrap(), "8");
        assert_eq!(evaluate("2^-1").unwrap(), "0.5");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            evaluate("100 / 0"),
            Err(ToolError::CalculationError(_))
        ));
        assert!(matches!(
            evaluate("1 / (2 - 2)"),
            Err(ToolError::CalculationError(_))
        ));
    }

    #[test]
    fn code_like_input_is_rejected() {
        assert!(evaluate("os.system('ls')").is_err());
        assert!(evaluate("__import__").is_err());
        assert!(evaluate("value + 1").is_err());
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn unary_minus_and_constants() {
        assert_eq!(evaluate("-5 + 3").unwrap(), "-2");
        let pi = evaluate("pi").unwrap().parse::<f64>().unwrap();
        assert!((pi - std::f64::consts::PI).abs() < 1e-12);
    }
}
