//! Small arithmetic expressions over named world variables.
//!
//! Text form: `${fuel}=3`, `${a}+1=${b}` (tests) and `++${count}`,
//! `${fuel}=${fuel}-1` (updates).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{PlannerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Increment,
    Equal,
    Plus,
    Minus,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Operator(Operator),
    Variable(String),
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expression {
    tokens: Vec<Token>,
}

impl Expression {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Variable(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Evaluates an `lhs=rhs` test. Missing variables make it false.
    pub fn is_valid(&self, variables: &BTreeMap<String, String>) -> bool {
        let Some(equal) = self
            .tokens
            .iter()
            .position(|token| *token == Token::Operator(Operator::Equal))
        else {
            return false;
        };
        let left = evaluate(&self.tokens[..equal], variables);
        let right = evaluate(&self.tokens[equal + 1..], variables);
        match (left, right) {
            (Some(left), Some(right)) => match (left.parse::<i64>(), right.parse::<i64>()) {
                (Ok(left), Ok(right)) => left == right,
                _ => left == right,
            },
            _ => false,
        }
    }

    /// Applies an update (`++${x}` or `${x}=rhs`). Returns whether a
    /// variable changed.
    pub fn apply(&self, variables: &mut BTreeMap<String, String>) -> bool {
        match self.tokens.as_slice() {
            [Token::Operator(Operator::Increment), Token::Variable(name)] => {
                let next = match variables.get(name) {
                    None => 1,
                    Some(current) => match current.parse::<i64>() {
                        Ok(current) => match current.checked_add(1) {
                            Some(next) => next,
                            None => {
                                warn!(variable = %name, value = current, "variable increment overflows");
                                return false;
                            }
                        },
                        Err(_) => {
                            warn!(variable = %name, value = %current, "cannot increment a non-numeric variable");
                            return false;
                        }
                    },
                };
                variables.insert(name.clone(), next.to_string());
                true
            }
            [Token::Variable(name), Token::Operator(Operator::Equal), rest @ ..] => {
                let Some(value) = evaluate(rest, variables) else {
                    warn!(expression = %self, "cannot evaluate assignment");
                    return false;
                };
                variables.insert(name.clone(), value.clone()) != Some(value)
            }
            _ => {
                warn!(expression = %self, "expression is not an update");
                false
            }
        }
    }
}

// A single operand, or an integer sum/difference of operands. Overflow
// makes the result undefined.
fn evaluate(tokens: &[Token], variables: &BTreeMap<String, String>) -> Option<String> {
    let operand = |token: &Token| match token {
        Token::Value(value) => Some(value.clone()),
        Token::Variable(name) => variables.get(name).cloned(),
        Token::Operator(_) => None,
    };
    match tokens {
        [] => None,
        [single] => operand(single),
        _ => {
            let mut total: i64 = 0;
            let mut sign: i64 = 1;
            let mut expect_operand = true;
            for token in tokens {
                match token {
                    Token::Operator(Operator::Plus) if expect_operand => {}
                    Token::Operator(Operator::Minus) if expect_operand => sign = -sign,
                    Token::Operator(Operator::Plus) => {
                        sign = 1;
                        expect_operand = true;
                    }
                    Token::Operator(Operator::Minus) => {
                        sign = -1;
                        expect_operand = true;
                    }
                    Token::Operator(_) => return None,
                    _ if expect_operand => {
                        let value: i64 = operand(token)?.parse().ok()?;
                        total = total.checked_add(sign.checked_mul(value)?)?;
                        expect_operand = false;
                    }
                    _ => return None,
                }
            }
            (!expect_operand).then(|| total.to_string())
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            match token {
                Token::Operator(Operator::Increment) => f.write_str("++")?,
                Token::Operator(Operator::Equal) => f.write_str("=")?,
                Token::Operator(Operator::Plus) => f.write_str("+")?,
                Token::Operator(Operator::Minus) => f.write_str("-")?,
                Token::Variable(name) => write!(f, "${{{name}}}")?,
                Token::Value(value) => f.write_str(value)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Expression {
    type Err = PlannerError;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = || PlannerError::InvalidExpression(text.to_owned());
        let mut tokens = Vec::new();
        let mut rest = text.trim();
        if let Some(stripped) = rest.strip_prefix("++") {
            tokens.push(Token::Operator(Operator::Increment));
            rest = stripped;
        }
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        let flush = |value: &mut String, tokens: &mut Vec<Token>| {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                tokens.push(Token::Value(trimmed.to_owned()));
            }
            value.clear();
        };
        while let Some(c) = chars.next() {
            let operator = match c {
                '=' => Some(Operator::Equal),
                '+' => Some(Operator::Plus),
                '-' => Some(Operator::Minus),
                _ => None,
            };
            if let Some(operator) = operator {
                flush(&mut value, &mut tokens);
                tokens.push(Token::Operator(operator));
            } else if c == '$' && chars.peek() == Some(&'{') {
                flush(&mut value, &mut tokens);
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(invalid()),
                    }
                }
                if name.trim().is_empty() {
                    return Err(invalid());
                }
                tokens.push(Token::Variable(name.trim().to_owned()));
            } else {
                value.push(c);
            }
        }
        flush(&mut value, &mut tokens);

        let has_variable = tokens.iter().any(|token| matches!(token, Token::Variable(_)));
        let is_increment = tokens.first() == Some(&Token::Operator(Operator::Increment));
        let has_equal = tokens.contains(&Token::Operator(Operator::Equal));
        if !has_variable || (is_increment == has_equal) {
            return Err(invalid());
        }
        Ok(Self { tokens })
    }
}

impl TryFrom<String> for Expression {
    type Error = PlannerError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<Expression> for String {
    fn from(expression: Expression) -> Self {
        expression.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn tests_compare_numbers_and_strings() {
        let variables = vars(&[("fuel", "3"), ("mode", "idle")]);
        assert!("${fuel}=3".parse::<Expression>().unwrap().is_valid(&variables));
        assert!("${fuel}+1=4".parse::<Expression>().unwrap().is_valid(&variables));
        assert!("${mode}=idle".parse::<Expression>().unwrap().is_valid(&variables));
        assert!(!"${missing}=1".parse::<Expression>().unwrap().is_valid(&variables));
    }

    #[test]
    fn increment_and_assignment() {
        let mut variables = vars(&[("mode", "idle")]);
        let increment: Expression = "++${count}".parse().unwrap();
        assert!(increment.apply(&mut variables));
        assert!(increment.apply(&mut variables));
        assert_eq!(variables["count"], "2");

        let assign: Expression = "${count}=${count}-5".parse().unwrap();
        assert!(assign.apply(&mut variables));
        assert_eq!(variables["count"], "-3");

        let bad: Expression = "++${mode}".parse().unwrap();
        assert!(!bad.apply(&mut variables));
        assert_eq!(variables["mode"], "idle");
    }

    #[test]
    fn overflow_keeps_the_previous_value() {
        let max = i64::MAX.to_string();
        let mut variables = vars(&[("count", max.as_str()), ("one", "1")]);

        let increment: Expression = "++${count}".parse().unwrap();
        assert!(!increment.apply(&mut variables));
        let assign: Expression = "${count}=${count}+${one}".parse().unwrap();
        assert!(!assign.apply(&mut variables));
        assert_eq!(variables["count"], max);

        let negated: Expression = "${low}=0-${min}".parse().unwrap();
        let min = i64::MIN.to_string();
        let mut variables = vars(&[("min", min.as_str())]);
        assert!(!negated.apply(&mut variables));
        assert!(!variables.contains_key("low"));
    }

    #[test]
    fn rejects_malformed_text() {
        assert!("3=3".parse::<Expression>().is_err());
        assert!("${x".parse::<Expression>().is_err());
        assert!("++${x}=2".parse::<Expression>().is_err());
        assert_eq!("${a}+1=${b}".parse::<Expression>().unwrap().to_string(), "${a}+1=${b}");
    }
}
