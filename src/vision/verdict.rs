//! Mapping of free-form classifier replies onto [`Occupancy`].
//!
//! The classifier is asked for `{"state": ..., "confidence": ..., "reason": ...}`
//! but its output is untrusted. Every input maps to some verdict; anything
//! outside the three labels becomes `unknown` and is flagged as an anomaly.

use serde_json::Value;

use crate::db::Occupancy;

/// A normalized classifier reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub state: Occupancy,
    pub confidence: Option<f64>,
    pub explanation: Option<String>,
    /// Set when the reply did not follow the label contract.
    pub anomaly: Option<String>,
}

impl Verdict {
    fn anomalous(reason: String) -> Self {
        Self {
            state: Occupancy::Unknown,
            confidence: None,
            explanation: None,
            anomaly: Some(reason),
        }
    }
}

const STATE_KEYS: [&str; 4] = ["state", "verdict", "occupancy", "status"];
const REASON_KEYS: [&str; 3] = ["reason", "explanation", "feedback"];

/// Occupancy for a raw reply. Deterministic and total.
pub fn normalize(raw: &str) -> Occupancy {
    parse_verdict(raw).state
}

pub fn parse_verdict(raw: &str) -> Verdict {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Verdict::anomalous("empty reply".into());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            let Some(label_value) = STATE_KEYS.iter().find_map(|key| map.get(*key)) else {
                return Verdict::anomalous("reply has no state field".into());
            };
            let Some(label_text) = label_value.as_str() else {
                return Verdict::anomalous(format!("non-text state {label_value}"));
            };
            let Some(state) = label(label_text) else {
                return Verdict::anomalous(format!("out-of-vocabulary state {label_text:?}"));
            };

            Verdict {
                state,
                confidence: map.get("confidence").and_then(confidence),
                explanation: REASON_KEYS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                anomaly: None,
            }
        }
        Ok(Value::String(s)) => bare_label(&s),
        Ok(Value::Array(_)) => Verdict::anomalous("reply is a list".into()),
        _ => bare_label(text),
    }
}

fn bare_label(text: &str) -> Verdict {
    match label(text) {
        Some(state) => Verdict {
            state,
            confidence: None,
            explanation: None,
            anomaly: None,
        },
        None => Verdict::anomalous(format!("out-of-vocabulary reply {:?}", truncate(text, 80))),
    }
}

/// Exact label match, ignoring case, surrounding quotes and trailing punctuation.
fn label(text: &str) -> Option<Occupancy> {
    let cleaned = text
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim_end_matches(['.', '!'])
        .trim()
        .to_ascii_lowercase();

    match cleaned.as_str() {
        "occupied" => Some(Occupancy::Occupied),
        "free" => Some(Occupancy::Free),
        "unknown" => Some(Occupancy::Unknown),
        _ => None,
    }
}

/// Confidence in `[0, 1]`; percentages are scaled down, anything else dropped.
fn confidence(value: &Value) -> Option<f64> {
    let number = value.as_f64()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    if number <= 1.0 {
        Some(number)
    } else if number <= 100.0 {
        Some(number / 100.0)
    } else {
        None
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
