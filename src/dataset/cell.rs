//! Typed dataset values.
//!
//! Column types are inferred the way a dataframe CSV reader does it: a column
//! is integer if every cell parses as an integer, float if every cell parses as
//! a finite float, boolean if every cell is a `True`/`False` spelling, and text
//! otherwise. Each value has a normalized text form that matches how the worker
//! runtime prints the same value, which is what scoring compares.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inferred column type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Text,
}

/// One dataset value
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl ColumnKind {
    /// Narrowest kind that accepts every value in the column.
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let values = values.into_iter();
        if values.clone().next().is_none() {
            return ColumnKind::Text;
        }
        if values.clone().all(|v| v.parse::<i64>().is_ok()) {
            ColumnKind::Integer
        } else if values.clone().all(|v| parse_float(v).is_some()) {
            ColumnKind::Float
        } else if values.clone().all(|v| parse_bool(v).is_some()) {
            ColumnKind::Boolean
        } else {
            ColumnKind::Text
        }
    }

    /// Parse `raw` as this kind. Falls back to text when the value does not
    /// fit, which only happens for cells outside the column they were inferred on.
    pub fn parse(self, raw: &str) -> Cell {
        let parsed = match self {
            ColumnKind::Integer => raw.parse::<i64>().ok().map(Cell::Int),
            ColumnKind::Float => parse_float(raw).map(Cell::Float),
            ColumnKind::Boolean => parse_bool(raw).map(Cell::Bool),
            ColumnKind::Text => None,
        };
        parsed.unwrap_or_else(|| Cell::Text(raw.to_string()))
    }
}

impl Cell {
    /// Text form used for exact-match scoring.
    pub fn normalized(&self) -> String {
        match self {
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) => python_float_repr(*v),
            Cell::Bool(true) => "True".to_string(),
            Cell::Bool(false) => "False".to_string(),
            Cell::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

/// Shortest round-trip rendering of `value` in the worker runtime's style:
/// fixed notation with at least one fractional digit for decimal exponents in
/// [-4, 16), scientific with a signed two-digit exponent otherwise.
pub fn python_float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "-1.25e-7".
    let sci = format!("{:e}", value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let sign = if negative { "-" } else { "" };

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            let (int_part, frac_part) = if digits.len() > int_len {
                (digits[..int_len].to_string(), digits[int_len..].to_string())
            } else {
                (format!("{:0<width$}", digits, width = int_len), "0".to_string())
            };
            format!("{}{}.{}", sign, int_part, frac_part)
        } else {
            let zeros = "0".repeat((-exponent - 1) as usize);
            format!("{}0.{}{}", sign, zeros, digits)
        }
    } else {
        let (head, tail) = digits.split_at(1);
        let mantissa = if tail.is_empty() {
            head.to_string()
        } else {
            format!("{}.{}", head, tail)
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exponent.abs())
    }
}
