//! Parameter and outcome constraint expressions.
//!
//! Parameter constraints are linear inequalities over parameter names, e.g.
//! `"x3 >= x4"` or `"-x3 + 2*x4 - 3.5*x5 >= 2"`. Outcome constraints bound a
//! single metric, e.g. `"m1 <= 3"`. Only `<=` and `>=` are accepted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use ob_types::{EngineError, EngineResult, Parameterization};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    LessEqual,
    GreaterEqual,
}

/// `sum(weights[name] * name) <= bound`, normalised to the `<=` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConstraint {
    pub expression: String,
    pub weights: BTreeMap<String, f64>,
    pub bound: f64,
}

impl ParameterConstraint {
    pub fn parse(expression: &str) -> EngineResult<Self> {
        let (lhs, op, rhs) = split_comparison(expression)?;
        let left = parse_linear(expression, lhs)?;
        let right = parse_linear(expression, rhs)?;

        // Move variables to the left and constants to the right.
        let mut weights = left.weights;
        for (name, w) in right.weights {
            *weights.entry(name).or_insert(0.0) -= w;
        }
        weights.retain(|_, w| *w != 0.0);
        let mut bound = right.constant - left.constant;
        if weights.is_empty() {
            return Err(parse_error(expression, "constraint references no parameter"));
        }
        if op == ComparisonOp::GreaterEqual {
            weights.values_mut().for_each(|w| *w = -*w);
            bound = -bound;
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            weights,
            bound,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Whether `point` satisfies the constraint. Names missing from the
    /// point count as violations.
    pub fn is_satisfied(&self, point: &Parameterization) -> bool {
        let mut total = 0.0;
        for (name, w) in &self.weights {
            match point.get(name) {
                Some(v) => total += w * v.as_f64(),
                None => return false,
            }
        }
        total <= self.bound + 1e-9
    }
}

/// Bound on a tracked metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeConstraint {
    pub expression: String,
    pub metric: String,
    pub op: ComparisonOp,
    pub bound: f64,
}

impl OutcomeConstraint {
    pub fn parse(expression: &str) -> EngineResult<Self> {
        let (lhs, op, rhs) = split_comparison(expression)?;
        let metric = lhs.trim();
        if !is_identifier(metric) {
            return Err(parse_error(expression, "left side must be a single metric name"));
        }
        let rhs = rhs.trim();
        if rhs.ends_with('%') {
            return Err(parse_error(expression, "relative bounds are not supported"));
        }
        let bound = rhs
            .parse::<f64>()
            .map_err(|_| parse_error(expression, "right side must be a number"))?;
        Ok(Self {
            expression: expression.trim().to_string(),
            metric: metric.to_string(),
            op,
            bound,
        })
    }

    pub fn is_satisfied(&self, value: f64) -> bool {
        match self.op {
            ComparisonOp::LessEqual => value <= self.bound,
            ComparisonOp::GreaterEqual => value >= self.bound,
        }
    }
}

fn parse_error(expression: &str, message: &str) -> EngineError {
    EngineError::ConstraintParse {
        expression: expression.to_string(),
        message: message.to_string(),
    }
}

fn split_comparison(expression: &str) -> EngineResult<(&str, ComparisonOp, &str)> {
    let found: Vec<(usize, ComparisonOp)> = expression
        .match_indices("<=")
        .map(|(i, _)| (i, ComparisonOp::LessEqual))
        .chain(
            expression
                .match_indices(">=")
                .map(|(i, _)| (i, ComparisonOp::GreaterEqual)),
        )
        .collect();
    match found.as_slice() {
        [(i, op)] => {
            let lhs = &expression[..*i];
            let rhs = &expression[i + 2..];
            let stray = |c: char| matches!(c, '<' | '>' | '=');
            if lhs.contains(stray) || rhs.contains(stray) {
                return Err(parse_error(expression, "unexpected comparison operator"));
            }
            Ok((lhs, *op, rhs))
        }
        [] => Err(parse_error(expression, "expected exactly one '<=' or '>='")),
        _ => Err(parse_error(expression, "more than one comparison operator")),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
}

fn tokenize(expression: &str, side: &str) -> EngineResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = side.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '-' || chars[i] == '+')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| parse_error(expression, &format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => {
                return Err(parse_error(expression, &format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

struct Linear {
    weights: BTreeMap<String, f64>,
    constant: f64,
}

/// Parse `[+-] term ([+-] term)*` where a term is a product of numbers and
/// at most one name.
fn parse_linear(expression: &str, side: &str) -> EngineResult<Linear> {
    let tokens = tokenize(expression, side)?;
    if tokens.is_empty() {
        return Err(parse_error(expression, "empty side"));
    }
    let mut linear = Linear {
        weights: BTreeMap::new(),
        constant: 0.0,
    };
    let mut pos = 0;
    let mut first = true;
    while pos < tokens.len() {
        let mut sign = 1.0;
        match tokens[pos] {
            Token::Plus => pos += 1,
            Token::Minus => {
                sign = -1.0;
                pos += 1;
            }
            _ if first => {}
            _ => return Err(parse_error(expression, "expected '+' or '-' between terms")),
        }
        first = false;

        let mut coef = sign;
        let mut name: Option<String> = None;
        loop {
            match tokens.get(pos) {
                Some(Token::Number(v)) => coef *= v,
                Some(Token::Name(n)) => {
                    if name.is_some() {
                        return Err(parse_error(expression, "non-linear term"));
                    }
                    name = Some(n.clone());
                }
                _ => return Err(parse_error(expression, "incomplete term")),
            }
            pos += 1;
            if tokens.get(pos) == Some(&Token::Star) {
                pos += 1;
            } else {
                break;
            }
        }
        match name {
            Some(n) => *linear.weights.entry(n).or_insert(0.0) += coef,
            None => linear.constant += coef,
        }
    }
    Ok(linear)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_types::ParameterValue;

    fn point(values: &[(&str, f64)]) -> Parameterization {
        values
            .iter()
            .map(|(n, v)| (n.to_string(), ParameterValue::Float(*v)))
            .collect()
    }

    #[test]
    fn order_constraint() {
        let c = ParameterConstraint::parse("x3 >= x4").unwrap();
        assert_eq!(c.weights.get("x3"), Some(&-1.0));
        assert_eq!(c.weights.get("x4"), Some(&1.0));
        assert_eq!(c.bound, 0.0);
        assert!(c.is_satisfied(&point(&[("x3", 2.0), ("x4", 1.0)])));
        assert!(!c.is_satisfied(&point(&[("x3", 0.0), ("x4", 1.0)])));
    }

    #[test]
    fn linear_constraint_with_coefficients() {
        let c = ParameterConstraint::parse("-x3 + 2*x4 - 3.5*x5 >= 2").unwrap();
        assert_eq!(c.weights.get("x3"), Some(&1.0));
        assert_eq!(c.weights.get("x4"), Some(&-2.0));
        assert_eq!(c.weights.get("x5"), Some(&3.5));
        assert_eq!(c.bound, -2.0);
        // -0 + 2*2 - 0 = 4 >= 2
        assert!(c.is_satisfied(&point(&[("x3", 0.0), ("x4", 2.0), ("x5", 0.0)])));
        // -1 + 0 - 3.5 = -4.5 < 2
        assert!(!c.is_satisfied(&point(&[("x3", 1.0), ("x4", 0.0), ("x5", 1.0)])));
    }

    #[test]
    fn sum_constraint() {
        let c = ParameterConstraint::parse("x1 + x2 <= 1.5e0").unwrap();
        assert_eq!(c.bound, 1.5);
        assert!(c.is_satisfied(&point(&[("x1", 0.5), ("x2", 1.0)])));
        assert!(!c.is_satisfied(&point(&[("x1", 0.6), ("x2", 1.0)])));
        assert!(!c.is_satisfied(&point(&[("x1", 0.1)])));
    }

    #[test]
    fn malformed_parameter_constraints() {
        for bad in ["x1 > x2", "x1 == 2", "x1 <= ", "x1 * x2 <= 1", "3 <= 4", "x1 x2 <= 1", "x1 <= 2 <= 3"] {
            assert!(
                matches!(
                    ParameterConstraint::parse(bad),
                    Err(EngineError::ConstraintParse { .. })
                ),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn outcome_constraint() {
        let c = OutcomeConstraint::parse("m1 <= 3.").unwrap();
        assert_eq!(c.metric, "m1");
        assert_eq!(c.op, ComparisonOp::LessEqual);
        assert_eq!(c.bound, 3.0);
        assert!(c.is_satisfied(2.0));
        assert!(!c.is_satisfied(3.5));

        let c = OutcomeConstraint::parse("energy >= -1").unwrap();
        assert!(c.is_satisfied(0.0));
    }

    #[test]
    fn malformed_outcome_constraints() {
        for bad in ["m1 < 3", "m1 + m2 <= 3", "m1 <= x", "m1 <= 5%", "<= 3"] {
            assert!(OutcomeConstraint::parse(bad).is_err(), "{bad} should not parse");
        }
    }
}
