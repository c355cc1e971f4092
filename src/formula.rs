//! A restricted arithmetic expression evaluator used by composite metrics
//! and (informationally) by dynamic pricing.
//!
//! Unlike a general-purpose expression library, the token set accepted here
//! is fixed and small: ASCII digits, `.`, the four arithmetic operators,
//! parentheses, and whitespace. Any other character is rejected before a
//! single token is parsed, so there is no path from a crafted formula
//! string to anything beyond basic arithmetic.

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use rust_decimal::Decimal;

/// An error encountered while evaluating a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// The expression contained a character outside the restricted token
    /// set.
    IllegalToken(char),
    /// The expression could not be parsed as valid arithmetic.
    Syntax(String),
    /// A `{var}` placeholder had no corresponding entry in the variable
    /// bindings.
    UnboundVariable(String),
    /// An unknown named function was referenced.
    UnknownFunction(String),
    /// The expression divided by zero.
    DivisionByZero,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::IllegalToken(c) => write!(f, "illegal token '{c}' in formula"),
            FormulaError::Syntax(detail) => write!(f, "formula syntax error: {detail}"),
            FormulaError::UnboundVariable(name) => {
                write!(f, "formula references unbound variable '{name}'")
            }
            FormulaError::UnknownFunction(name) => write!(f, "unknown formula function '{name}'"),
            FormulaError::DivisionByZero => write!(f, "formula divided by zero"),
        }
    }
}

impl std::error::Error for FormulaError {}

/// Evaluates an `arithmetic` formula: substitutes each `{var}` placeholder
/// with the corresponding entry in `inputs`, then parses and evaluates the
/// resulting expression.
///
/// `variables` maps a placeholder name used in `expression` to the source
/// metric name whose value should be substituted; `inputs` maps a metric
/// name to its numeric value.
pub fn evaluate_arithmetic(
    expression: &str,
    variables: &HashMap<String, String>,
    inputs: &HashMap<String, Decimal>,
) -> Result<Decimal, FormulaError> {
    let substituted = substitute_variables(expression, variables, inputs)?;
    let mut tokens = Lexer::new(&substituted).peekable();
    let value = parse_expr(&mut tokens)?;
    if let Some(tok) = tokens.next() {
        return Err(FormulaError::Syntax(format!("unexpected trailing token {tok:?}")));
    }
    Ok(value)
}

/// Evaluates the `weighted_sum` builtin: `sum(weights[m] * inputs[m])` over
/// every metric named in `weights`. Any other function name is rejected.
pub fn evaluate_function(
    name: &str,
    weights: &HashMap<String, Decimal>,
    inputs: &HashMap<String, Decimal>,
) -> Result<Decimal, FormulaError> {
    if name != "weighted_sum" {
        return Err(FormulaError::UnknownFunction(name.to_string()));
    }
    let mut total = Decimal::ZERO;
    for (metric, weight) in weights {
        let value = inputs
            .get(metric)
            .copied()
            .ok_or_else(|| FormulaError::UnboundVariable(metric.clone()))?;
        total += weight * value;
    }
    Ok(total)
}

/// Validates that `expression` is syntactically well-formed arithmetic,
/// without requiring real variable bindings. Used at price-component
/// creation time to reject a malformed `dynamic` pricing formula eagerly
/// rather than silently at evaluation time, which never happens for
/// `dynamic` since its charge is always `q * base_rate`.
pub fn validate_syntax(expression: &str) -> Result<(), FormulaError> {
    let mut placeholder_free = String::with_capacity(expression.len());
    let mut chars = expression.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(_) => continue,
                    None => return Err(FormulaError::Syntax("unterminated placeholder".into())),
                }
            }
            placeholder_free.push('0');
        } else {
            placeholder_free.push(c);
        }
    }
    let mut tokens = Lexer::new(&placeholder_free).peekable();
    let _ = parse_expr(&mut tokens)?;
    if let Some(tok) = tokens.next() {
        return Err(FormulaError::Syntax(format!("unexpected trailing token {tok:?}")));
    }
    Ok(())
}

fn substitute_variables(
    expression: &str,
    variables: &HashMap<String, String>,
    inputs: &HashMap<String, Decimal>,
) -> Result<String, FormulaError> {
    let mut out = String::with_capacity(expression.len());
    let mut chars = expression.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => name.push(c),
                    None => return Err(FormulaError::Syntax("unterminated placeholder".into())),
                }
            }
            let metric = variables
                .get(&name)
                .ok_or_else(|| FormulaError::UnboundVariable(name.clone()))?;
            let value = inputs
                .get(metric)
                .ok_or_else(|| FormulaError::UnboundVariable(metric.clone()))?;
            out.push_str(&value.to_string());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, FormulaError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.chars.peek().copied() {
                None => return None,
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                Some('+') => {
                    self.chars.next();
                    return Some(Ok(Token::Plus));
                }
                Some('-') => {
                    self.chars.next();
                    return Some(Ok(Token::Minus));
                }
                Some('*') => {
                    self.chars.next();
                    return Some(Ok(Token::Star));
                }
                Some('/') => {
                    self.chars.next();
                    return Some(Ok(Token::Slash));
                }
                Some('(') => {
                    self.chars.next();
                    return Some(Ok(Token::LParen));
                }
                Some(')') => {
                    self.chars.next();
                    return Some(Ok(Token::RParen));
                }
                Some(c) if c.is_ascii_digit() || c == '.' => {
                    let mut literal = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_ascii_digit() || c == '.' {
                            literal.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    return match literal.parse::<Decimal>() {
                        Ok(n) => Some(Ok(Token::Number(n))),
                        Err(_) => Some(Err(FormulaError::Syntax(format!("bad number '{literal}'")))),
                    };
                }
                Some(c) => return Some(Err(FormulaError::IllegalToken(c))),
            }
        }
    }
}

type TokenStream<'a> = Peekable<Lexer<'a>>;

fn parse_expr(tokens: &mut TokenStream) -> Result<Decimal, FormulaError> {
    let mut value = parse_term(tokens)?;
    loop {
        match tokens.peek() {
            Some(Ok(Token::Plus)) => {
                tokens.next();
                value += parse_term(tokens)?;
            }
            Some(Ok(Token::Minus)) => {
                tokens.next();
                value -= parse_term(tokens)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_term(tokens: &mut TokenStream) -> Result<Decimal, FormulaError> {
    let mut value = parse_factor(tokens)?;
    loop {
        match tokens.peek() {
            Some(Ok(Token::Star)) => {
                tokens.next();
                value *= parse_factor(tokens)?;
            }
            Some(Ok(Token::Slash)) => {
                tokens.next();
                let divisor = parse_factor(tokens)?;
                if divisor.is_zero() {
                    return Err(FormulaError::DivisionByZero);
                }
                value /= divisor;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_factor(tokens: &mut TokenStream) -> Result<Decimal, FormulaError> {
    match tokens.next() {
        Some(Ok(Token::Number(n))) => Ok(n),
        Some(Ok(Token::Minus)) => Ok(-parse_factor(tokens)?),
        Some(Ok(Token::LParen)) => {
            let value = parse_expr(tokens)?;
            match tokens.next() {
                Some(Ok(Token::RParen)) => Ok(value),
                _ => Err(FormulaError::Syntax("expected closing parenthesis".into())),
            }
        }
        Some(Ok(tok)) => Err(FormulaError::Syntax(format!("unexpected token {tok:?}"))),
        Some(Err(e)) => Err(e),
        None => Err(FormulaError::Syntax("unexpected end of expression".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn evaluates_basic_arithmetic() {
        let mut variables = HashMap::new();
        variables.insert("a".to_string(), "requests".to_string());
        variables.insert("b".to_string(), "bytes".to_string());
        let mut inputs = HashMap::new();
        inputs.insert("requests".to_string(), dec!(10));
        inputs.insert("bytes".to_string(), dec!(2));

        let result = evaluate_arithmetic("({a} + {b}) * 2", &variables, &inputs).unwrap();
        assert_eq!(result, dec!(24));
    }

    #[test]
    fn rejects_illegal_tokens() {
        let err = evaluate_arithmetic("1; DROP TABLE", &HashMap::new(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, FormulaError::IllegalToken(';')));
    }

    #[test]
    fn rejects_division_by_zero() {
        let err = evaluate_arithmetic("1 / 0", &HashMap::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err, FormulaError::DivisionByZero);
    }

    #[test]
    fn weighted_sum_combines_inputs() {
        let mut weights = HashMap::new();
        weights.insert("cpu".to_string(), dec!(0.5));
        weights.insert("mem".to_string(), dec!(0.25));
        let mut inputs = HashMap::new();
        inputs.insert("cpu".to_string(), dec!(10));
        inputs.insert("mem".to_string(), dec!(4));

        let result = evaluate_function("weighted_sum", &weights, &inputs).unwrap();
        assert_eq!(result, dec!(6));
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = evaluate_function("sum", &HashMap::new(), &HashMap::new()).unwrap_err();
        assert_eq!(err, FormulaError::UnknownFunction("sum".into()));
    }
}
