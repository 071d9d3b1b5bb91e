use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Declared type of a field or literal parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text
    #[serde(alias = "text")]
    String,
    /// Signed 64-bit integer
    #[serde(alias = "int")]
    Integer,
    /// Fixed-point decimal
    #[serde(alias = "number", alias = "float")]
    Decimal,
    /// Boolean flag
    #[serde(alias = "bool")]
    Boolean,
    /// Calendar date without time zone
    Date,
}

impl FieldType {
    /// The value a missing field resolves to when it has no default
    pub fn zero_value(&self) -> FieldValue {
        match self {
            FieldType::String => FieldValue::String(String::new()),
            FieldType::Integer => FieldValue::Integer(0),
            FieldType::Decimal => FieldValue::Decimal(BigDecimal::from(0)),
            FieldType::Boolean => FieldValue::Boolean(false),
            FieldType::Date => FieldValue::Null,
        }
    }

    /// Coerce a raw JSON value to this type
    pub fn coerce(&self, raw: &Value) -> Result<FieldValue, CoreError> {
        if raw.is_null() {
            return Ok(FieldValue::Null);
        }

        let mismatch = || {
            CoreError::ValidationError(format!("cannot convert {} to {}", raw, self))
        };

        match self {
            FieldType::String => Ok(FieldValue::String(match raw {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            FieldType::Integer => match raw {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(FieldValue::Integer(i))
                    } else {
                        match n.as_f64() {
                            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                                Ok(FieldValue::Integer(f as i64))
                            }
                            _ => Err(mismatch()),
                        }
                    }
                }
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(FieldValue::Integer)
                    .map_err(|_| mismatch()),
                Value::Bool(b) => Ok(FieldValue::Integer(i64::from(*b))),
                _ => Err(mismatch()),
            },
            FieldType::Decimal => match raw {
                Value::Number(n) => BigDecimal::from_str(&n.to_string())
                    .map(FieldValue::Decimal)
                    .map_err(|_| mismatch()),
                Value::String(s) => BigDecimal::from_str(s.trim())
                    .map(FieldValue::Decimal)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldType::Boolean => match raw {
                Value::Bool(b) => Ok(FieldValue::Boolean(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(FieldValue::Boolean(false)),
                    Some(1) => Ok(FieldValue::Boolean(true)),
                    _ => Err(mismatch()),
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" => Ok(FieldValue::Boolean(true)),
                    "0" | "false" => Ok(FieldValue::Boolean(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            FieldType::Date => match raw {
                Value::String(s) => {
                    let s = s.trim();
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
                        .map(FieldValue::Date)
                        .map_err(|_| mismatch())
                }
                _ => Err(mismatch()),
            },
        }
    }

    /// Convert an already typed value to this type
    pub fn coerce_value(&self, value: &FieldValue) -> Result<FieldValue, CoreError> {
        match (self, value) {
            (_, FieldValue::Null) => Ok(FieldValue::Null),
            (FieldType::String, FieldValue::String(_))
            | (FieldType::Integer, FieldValue::Integer(_))
            | (FieldType::Decimal, FieldValue::Decimal(_))
            | (FieldType::Boolean, FieldValue::Boolean(_))
            | (FieldType::Date, FieldValue::Date(_)) => Ok(value.clone()),
            (FieldType::Decimal, FieldValue::Integer(i)) => {
                Ok(FieldValue::Decimal(BigDecimal::from(*i)))
            }
            (FieldType::Integer, FieldValue::Decimal(d)) if !d.is_integer() => Err(
                CoreError::ValidationError(format!("cannot convert {} to integer", d)),
            ),
            (FieldType::Integer, FieldValue::Decimal(d)) => d
                .with_scale(0)
                .to_string()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| {
                    CoreError::ValidationError(format!("cannot convert {} to integer", d))
                }),
            (FieldType::String, other) => Ok(FieldValue::String(other.as_text())),
            (ty, other) => ty.coerce(&Value::String(other.as_text())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        };
        f.write_str(name)
    }
}

/// A typed value produced by parameter resolution or returned by a function
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Absent value
    #[default]
    Null,
    /// Text
    String(String),
    /// Integer
    Integer(i64),
    /// Fixed-point decimal
    Decimal(BigDecimal),
    /// Boolean
    Boolean(bool),
    /// Date
    Date(NaiveDate),
}

impl FieldValue {
    /// Whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Truthiness used for condition results
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Boolean(b) => *b,
            FieldValue::Integer(i) => *i != 0,
            FieldValue::Decimal(d) => *d != BigDecimal::from(0),
            FieldValue::String(s) => !s.is_empty(),
            FieldValue::Date(_) => true,
        }
    }

    /// Numeric view of the value; numeric strings are accepted
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            FieldValue::Integer(i) => Some(BigDecimal::from(*i)),
            FieldValue::Decimal(d) => Some(d.clone()),
            FieldValue::String(s) => BigDecimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Textual representation, used for table keys and string functions
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::String(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Compare two values; numbers compare numerically across integer and decimal
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Null, _) | (_, FieldValue::Null) => None,
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Equality with numeric widening
    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Render into the JSON stored in the execution context.
    ///
    /// Decimals become JSON numbers only when a double holds them exactly;
    /// any other decimal is rendered as its exact decimal string.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Decimal(d) => exact_number(d).unwrap_or_else(|| Value::String(d.to_string())),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Best-effort typing of an untyped JSON value
    pub fn from_json(raw: &Value) -> FieldValue {
        match raw {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => BigDecimal::from_str(&n.to_string())
                    .map(FieldValue::Decimal)
                    .unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(other.to_string()),
        }
    }
}

fn exact_number(d: &BigDecimal) -> Option<Value> {
    let number = d.to_string().parse::<f64>().ok().and_then(serde_json::Number::from_f64)?;
    let round_trip = BigDecimal::from_str(&number.to_string()).ok()?;
    (round_trip == *d).then_some(Value::Number(number))
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            other => f.write_str(&other.as_text()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<BigDecimal> for FieldValue {
    fn from(d: BigDecimal) -> Self {
        FieldValue::Decimal(d)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}
