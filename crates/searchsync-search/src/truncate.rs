//! Payload truncation under a byte budget.
//!
//! While the serialized payload is over budget, the field with the largest
//! serialized value is halved: strings by code points, lists by element
//! count. Protected fields (`id` and meta) are never touched. There is no
//! floor, so a field may end up empty.

use serde_json::Value;
use tracing::warn;

use crate::backend::DocumentPayload;
use crate::error::SearchError;

/// What a truncation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncationReport {
    pub original_size: usize,
    pub final_size: usize,
    /// Names of fields shortened, in the order they were first touched.
    pub fields: Vec<String>,
}

impl TruncationReport {
    pub fn truncated(&self) -> bool {
        !self.fields.is_empty()
    }
}

fn serialized_len(value: &impl serde::Serialize) -> Result<usize, SearchError> {
    Ok(serde_json::to_vec(value)?.len())
}

fn halve(value: &mut Value) -> bool {
    match value {
        Value::String(s) if !s.is_empty() => {
            let keep = s.chars().count() / 2;
            let cut = s.char_indices().nth(keep).map_or(s.len(), |(i, _)| i);
            s.truncate(cut);
            true
        }
        Value::Array(items) if !items.is_empty() => {
            items.truncate(items.len() / 2);
            true
        }
        _ => false,
    }
}

fn is_truncatable(value: &Value) -> bool {
    matches!(value, Value::String(s) if !s.is_empty())
        || matches!(value, Value::Array(items) if !items.is_empty())
}

/// Shrink `payload` until it serializes to at most `max_size` bytes.
///
/// Stops early, with a warning, when only protected or non-truncatable
/// fields remain.
pub fn truncate_payload(
    payload: &mut DocumentPayload,
    max_size: usize,
    protected: &[&str],
) -> Result<TruncationReport, SearchError> {
    let original_size = serialized_len(payload)?;
    let mut report = TruncationReport {
        original_size,
        final_size: original_size,
        fields: Vec::new(),
    };

    while report.final_size > max_size {
        let mut largest: Option<(String, usize)> = None;
        for (name, value) in payload.iter() {
            if protected.contains(&name.as_str()) || !is_truncatable(value) {
                continue;
            }
            let size = serialized_len(value)?;
            if largest.as_ref().map_or(true, |(_, best)| size > *best) {
                largest = Some((name.clone(), size));
            }
        }

        let Some((name, _)) = largest else {
            warn!(
                size = report.final_size,
                max_size, "Payload still over budget with nothing left to truncate"
            );
            break;
        };

        if let Some(value) = payload.get_mut(&name) {
            halve(value);
        }
        if !report.fields.contains(&name) {
            report.fields.push(name);
        }
        report.final_size = serialized_len(payload)?;
    }

    Ok(report)
}
