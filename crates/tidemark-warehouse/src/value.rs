//! Scalar values returned by warehouse read queries.

use std::fmt;

/// A single column value.
///
/// Backends that only speak the text protocol return [`Value::Text`]; the
/// comparison helpers are therefore numeric-aware so `Text("0")` matches
/// `Int(0)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Floats at or beyond this magnitude do not fit in an `i64`.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// One result row, in column order.
pub type Row = Vec<Value>;

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value, parsing text and accepting integral floats.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(b) => Some(i64::from(*b)),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) if f.fract() == 0.0 && f.abs() < TWO_POW_63 => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Float(_) | Self::Null => None,
        }
    }

    /// Floating-point view of the value, parsing text.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }

    /// Loose equality used by quality assertions.
    ///
    /// `Null` only matches `Null`. Two values that both read as numbers are
    /// compared numerically; booleans also match `t`/`f`/`true`/`false`
    /// text; everything else compares by display form.
    #[must_use]
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Bool(a), Self::Text(t)) | (Self::Text(t), Self::Bool(a)) => {
                parse_bool(t) == Some(*a)
            }
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                    _ => self.to_string() == other.to_string(),
                },
            },
        }
    }

    /// Convert a JSON scalar. Arrays and objects become their JSON text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_else(|| Self::Text(n.to_string())),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" => Some(true),
        "f" | "false" | "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_numbers_match_ints() {
        assert!(Value::Text("0".into()).matches(&Value::Int(0)));
        assert!(Value::Int(5).matches(&Value::Text(" 5 ".into())));
        assert!(!Value::Text("1".into()).matches(&Value::Int(0)));
    }

    #[test]
    fn floats_and_ints_compare_numerically() {
        assert!(Value::Float(3.0).matches(&Value::Int(3)));
        assert!(!Value::Float(3.5).matches(&Value::Int(3)));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = 9_007_199_254_740_992_i64; // 2^53
        assert!(!Value::Int(big + 1).matches(&Value::Int(big)));
        assert!(!Value::from("9007199254740993").matches(&Value::Int(big)));
        assert!(Value::from("9007199254740993").matches(&Value::Int(big + 1)));
        assert!(Value::Int(i64::MAX).matches(&Value::Int(i64::MAX)));
        assert_eq!(Value::Float(1e19).as_i64(), None);
    }

    #[test]
    fn null_only_matches_null() {
        assert!(Value::Null.matches(&Value::Null));
        assert!(!Value::Null.matches(&Value::Int(0)));
        assert!(!Value::Text("NULL".into()).matches(&Value::Null));
    }

    #[test]
    fn bool_matches_postgres_text_form() {
        assert!(Value::Bool(true).matches(&Value::Text("t".into())));
        assert!(Value::Text("false".into()).matches(&Value::Bool(false)));
    }

    #[test]
    fn strings_compare_by_text() {
        assert!(Value::from("paid").matches(&Value::from("paid")));
        assert!(!Value::from("paid").matches(&Value::from("free")));
    }

    #[test]
    fn as_i64_conversions() {
        assert_eq!(Value::Text("42".into()).as_i64(), Some(42));
        assert_eq!(Value::Float(7.0).as_i64(), Some(7));
        assert_eq!(Value::Float(7.5).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn from_json_scalars() {
        assert_eq!(Value::from_json(&serde_json::json!(1541105830796_i64)), Value::Int(1_541_105_830_796));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&serde_json::json!("Walla")), Value::from("Walla"));
        assert_eq!(Value::from_json(&serde_json::json!(null)), Value::Null);
        assert_eq!(
            Value::from_json(&serde_json::json!({"a": 1})),
            Value::Text("{\"a\":1}".into())
        );
    }
}
