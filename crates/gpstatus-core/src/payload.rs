//! Classification of SSE frame data into evaluation feed payloads.
//!
//! The service sends three JSON shapes:
//!
//! ```text
//! {"error": "Roll number not found"}            -> FeedPayload::NotFound
//! {"done": true}                                -> FeedPayload::Done
//! {"row_id": 3, "status": "...", "result": {..}} -> FeedPayload::Row
//! ```
//!
//! `error` and `done` are tested for truthiness the way the browser client
//! did, so `{"error": "..."}` and `{"error": true}` are equivalent.

use serde_json::Value;

use crate::error::CoreError;
use crate::types::EvaluationResult;

/// Upsert instruction for a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub row_id: u64,
    /// `None` when the payload carried no status string.
    pub status: Option<String>,
    pub result: Option<EvaluationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPayload {
    /// Server has no records for the roll number.
    NotFound { message: Option<String> },
    /// Stream completion.
    Done,
    Row(RowUpdate),
}

/// JavaScript truthiness of a JSON value.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Classify the `data` of one SSE frame.
pub fn classify(data: &str) -> Result<FeedPayload, CoreError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| CoreError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| CoreError::MalformedPayload("payload is not an object".to_owned()))?;

    if let Some(err) = obj.get("error").filter(|v| truthy(v)) {
        return Ok(FeedPayload::NotFound {
            message: err.as_str().map(str::to_owned),
        });
    }

    if obj.get("done").is_some_and(truthy) {
        return Ok(FeedPayload::Done);
    }

    let row_id = match obj.get("row_id") {
        Some(v) => v.as_u64().ok_or_else(|| {
            CoreError::MalformedPayload(format!("row_id is not a non-negative integer: {v}"))
        })?,
        None => {
            return Err(CoreError::MalformedPayload(
                "payload has no error, done or row_id".to_owned(),
            ));
        }
    };

    let status = obj.get("status").and_then(Value::as_str).map(str::to_owned);

    let result = match obj.get("result") {
        None | Some(Value::Null) => None,
        Some(v @ Value::Object(_)) => Some(
            serde_json::from_value::<EvaluationResult>(v.clone()).map_err(|e| {
                CoreError::MalformedPayload(format!("row {row_id}: bad result: {e}"))
            })?,
        ),
        Some(other) => {
            return Err(CoreError::MalformedPayload(format!(
                "row {row_id}: result is not an object: {other}"
            )));
        }
    };

    Ok(FeedPayload::Row(RowUpdate {
        row_id,
        status,
        result,
    }))
}
