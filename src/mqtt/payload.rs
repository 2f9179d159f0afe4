//! Payload decoding primitives.
//!
//! Every decoder here is total: it returns a value or `None` ("no opinion") and
//! never touches entity state. Callers decide what to do with the result.

use serde_json::{Map, Value};

const TRUTHY: &[&str] = &["1", "true", "online", "yes", "on", "ok", "open"];
const FALSY: &[&str] = &["0", "false", "offline", "no", "off", "closed", "close"];

/// Lowest and highest accepted battery level.
pub const LEVEL_MIN: f64 = 0.0;
pub const LEVEL_MAX: f64 = 100.0;

/// Trims and lowercases a textual payload.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn truthy(text: &str) -> bool {
    TRUTHY.contains(&normalize(text).as_str())
}

pub fn falsy(text: &str) -> bool {
    FALSY.contains(&normalize(text).as_str())
}

/// Generic boolean decode: truthy, falsy, or no opinion.
pub fn decode_bool(text: &str) -> Option<bool> {
    if truthy(text) {
        Some(true)
    } else if falsy(text) {
        Some(false)
    } else {
        None
    }
}

/// Parses a percentage and clamps it into `[0, 100]`.
///
/// Only the leading number is read, so units after it (`"42%"`, `"3.0V"`) are
/// ignored. Unparsable or non-finite input yields `None`.
pub fn decode_level(text: &str) -> Option<f64> {
    let value: f64 = leading_number(text.trim_start())?.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(LEVEL_MIN, LEVEL_MAX))
}

/// The longest prefix of `text` that forms a decimal number with an optional
/// sign, fraction and exponent. `None` if it starts with no digit.
fn leading_number(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits_from(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }
    Some(&text[..end])
}

/// Parses the payload as a JSON object. Anything else is swallowed.
pub fn decode_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// A raw inbound payload with its normalized token precomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    raw: String,
    token: String,
}

impl Payload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_text(&String::from_utf8_lossy(bytes))
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            raw: text.to_string(),
            token: normalize(text),
        }
    }

    /// The payload exactly as received (lossy UTF-8).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Trimmed, lowercased form used for vocabulary lookups.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_truthy(&self) -> bool {
        TRUTHY.contains(&self.token.as_str())
    }

    pub fn is_falsy(&self) -> bool {
        FALSY.contains(&self.token.as_str())
    }

    pub fn as_bool(&self) -> Option<bool> {
        decode_bool(&self.token)
    }

    pub fn as_level(&self) -> Option<f64> {
        decode_level(&self.raw)
    }

    pub fn as_object(&self) -> Option<Map<String, Value>> {
        decode_object(&self.raw)
    }

    /// True if the normalized token is one of `tokens`.
    pub fn is_one_of(&self, tokens: &[&str]) -> bool {
        tokens.contains(&self.token.as_str())
    }
}

/// How a JSON field contributes to a boolean facet.
#[derive(Debug, Clone, Copy)]
pub enum FieldProbe {
    /// Boolean field taken as-is.
    Flag(&'static str),
    /// Boolean field whose meaning is inverted (`contact: false` means open).
    InvertedFlag(&'static str),
    /// String field compared against true/false token lists.
    Text {
        field: &'static str,
        on: &'static [&'static str],
        off: &'static [&'static str],
    },
}

/// Probes `object` in order and returns the first field that resolves.
///
/// A field that is present with the wrong JSON type is skipped; a text field
/// with an unknown value stops the probe without an opinion.
pub fn probe_object(object: &Map<String, Value>, probes: &[FieldProbe]) -> Option<bool> {
    for probe in probes {
        match *probe {
            FieldProbe::Flag(field) => {
                if let Some(Value::Bool(flag)) = object.get(field) {
                    return Some(*flag);
                }
            }
            FieldProbe::InvertedFlag(field) => {
                if let Some(Value::Bool(flag)) = object.get(field) {
                    return Some(!*flag);
                }
            }
            FieldProbe::Text { field, on, off } => {
                if let Some(Value::String(text)) = object.get(field) {
                    let token = normalize(text);
                    if on.contains(&token.as_str()) {
                        return Some(true);
                    }
                    if off.contains(&token.as_str()) {
                        return Some(false);
                    }
                    return None;
                }
            }
        }
    }
    None
}
