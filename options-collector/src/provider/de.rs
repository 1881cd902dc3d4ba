//! Lenient field deserializers for provider payloads.
//!
//! Providers mix numbers, numeric strings, `"NaN"` and placeholder strings in
//! the same field. Anything unusable becomes `None`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(v)) => Some(v as f64),
        Some(Loose::Float(v)) => Some(v),
        Some(Loose::Text(s)) => s.trim().parse::<f64>().ok(),
        Some(Loose::Bool(_)) | None => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(v)) => Some(v),
        Some(Loose::Float(v)) if v.is_finite() => Some(v as i64),
        Some(Loose::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v as i64),
        _ => None,
    })
}

/// Boolean flags arrive as `true`, `"NO"`, `"Y"`, `0`, ... Unrecognised
/// placeholders are treated as unreported.
pub(crate) fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Bool(b)) => Some(b),
        Some(Loose::Int(v)) => Some(v != 0),
        Some(Loose::Float(v)) => Some(v != 0.0),
        Some(Loose::Text(s)) => parse_flag(&s),
        None => None,
    })
}

pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_uppercase().as_str() {
        "TRUE" | "YES" | "Y" | "1" => Some(true),
        "FALSE" | "NO" | "N" | "0" => Some(false),
        _ => None,
    }
}
