//! `key=value` parameter coercion

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A typed directive parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// All-digit value
    Int(i64),
    /// `digits.digits` value
    Float(f64),
    /// Anything else, trimmed
    Text(String),
}

impl ParamValue {
    /// Classify a raw value
    ///
    /// Only plain ASCII decimal forms are numeric: no sign, no exponent, and a
    /// float needs at least one digit after a single dot. Integers too large
    /// for `i64` and floats too large for `f64` stay text.
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        let value = raw.trim();

        if is_digits(value) {
            if let Ok(n) = value.parse() {
                return Self::Int(n);
            }
        } else if let Some((int_part, frac_part)) = value.split_once('.') {
            if (int_part.is_empty() || is_digits(int_part)) && is_digits(frac_part) {
                // Overlong digit runs overflow to infinity, which JSON cannot carry
                match value.parse::<f64>() {
                    Ok(n) if n.is_finite() => return Self::Float(n),
                    _ => {}
                }
            }
        }

        Self::Text(value.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse `|`-separated `key=value` pairs
///
/// Pairs without `=` or with an empty key are skipped. Later duplicates
/// overwrite earlier ones.
#[must_use]
pub fn parse_params(raw: &str) -> BTreeMap<String, ParamValue> {
    raw.split('|')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), ParamValue::coerce(value)))
        })
        .collect()
}
