//! Bound Expressions
//!
//! Integration bounds are written as arithmetic expressions (`"pi / 2"`,
//! `"2 * e"`) and evaluated with `evalexpr` against a small set of
//! constants.

use evalexpr::{
    ContextWithMutableVariables, EvalexprError, HashMapContext, Value, eval_with_context,
};
use thiserror::Error;

/// Errors from bound evaluation
#[derive(Debug, Error)]
pub enum BoundError {
    #[error("Evaluation error: {0}")]
    EvalError(String),

    #[error("Bound is not finite: {0}")]
    NotFinite(f64),
}

/// Constants available in bound expressions
const CONSTANTS: [(&str, f64); 3] = [
    ("pi", std::f64::consts::PI),
    ("tau", std::f64::consts::TAU),
    ("e", std::f64::consts::E),
];

/// Evaluate a bound expression to a finite number.
pub fn evaluate(expression: &str) -> Result<f64, BoundError> {
    let mut ctx = HashMapContext::new();
    for (name, value) in CONSTANTS {
        ctx.set_value(name.to_string(), Value::Float(value))
            .map_err(|e: EvalexprError| BoundError::EvalError(e.to_string()))?;
    }

    let result =
        eval_with_context(expression, &ctx).map_err(|e| BoundError::EvalError(e.to_string()))?;

    let value = match result {
        Value::Float(f) => f,
        Value::Int(i) => i as f64,
        other => {
            return Err(BoundError::EvalError(format!(
                "Expected numeric result, got {:?}",
                other
            )));
        }
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(BoundError::NotFinite(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(evaluate("0").unwrap(), 0.0);
        assert_eq!(evaluate("-1.5").unwrap(), -1.5);
    }

    #[test]
    fn test_constants() {
        assert!((evaluate("pi / 2").unwrap() - PI / 2.0).abs() < f64::EPSILON);
        assert!((evaluate("tau").unwrap() - 2.0 * PI).abs() < f64::EPSILON);
        assert!((evaluate("2 * e").unwrap() - 2.0 * std::f64::consts::E).abs() < f64::EPSILON);
    }

    #[test]
    fn test_integer_arithmetic_promoted() {
        assert_eq!(evaluate("3 + 4").unwrap(), 7.0);
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!(evaluate("1 < 2").is_err());
        assert!(evaluate("\"pi\"").is_err());
        assert!(evaluate("unknown_constant").is_err());
    }

    #[test]
    fn test_rejects_infinite() {
        assert!(matches!(evaluate("1.0 / 0.0"), Err(BoundError::NotFinite(_))));
    }
}
