//! Structural validation of inbound frames.
//!
//! Every inbound frame passes through [`validate`] before any field is
//! interpreted. The rules:
//!
//! - `status` is mandatory and must be a string.
//! - `status` equal to `"success"` (any case) requires `data`.
//! - any other `status` requires `message`.
//! - in [`ValidationMode::Strict`], top-level keys outside the allow-list are
//!   rejected. [`ValidationMode::Relaxed`] tolerates them so newer workers can
//!   add optional fields without forcing a client upgrade.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::envelope::{self, json_kind};
use crate::errors::ClientError;

/// Top-level keys a response frame may carry in strict mode.
pub const ALLOWED_KEYS: [&str; 4] = ["status", "action", "message", "data"];

/// How unknown top-level keys are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Mandatory fields are checked; unknown keys are accepted.
    #[default]
    Relaxed,
    /// Mandatory fields are checked; unknown keys are rejected.
    Strict,
}

/// Returns `true` if a `status` value denotes success.
pub fn is_success(status: &str) -> bool {
    status.eq_ignore_ascii_case("success")
}

/// A frame that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: String,
    data: Option<Value>,
    message: Option<String>,
    rest: Map<String, Value>,
}

impl Response {
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        is_success(&self.status)
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Value> {
        self.data
    }

    /// Server-provided diagnostic; always present on non-success responses.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Top-level field outside `status`, `data` and `message`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.rest.get(key)
    }
}

/// Decodes and validates an inference response frame.
pub fn validate(frame: &[u8], mode: ValidationMode) -> Result<Response, ClientError> {
    let response = validate_envelope(frame, mode, &[])?;
    if response.is_success() && response.data.is_none() {
        return Err(ClientError::data_format(
            "when success, a 'data' key is needed",
        ));
    }
    Ok(response)
}

/// Checks everything except the success payload, which differs between
/// handshake generations (`data` vs `workload_typing`).
///
/// `extra_allowed` extends [`ALLOWED_KEYS`] in strict mode.
pub(crate) fn validate_envelope(
    frame: &[u8],
    mode: ValidationMode,
    extra_allowed: &[&str],
) -> Result<Response, ClientError> {
    let mut map = envelope::decode(frame)?;
    check_keys(&map, mode, extra_allowed)?;

    let status = match map.remove("status") {
        Some(Value::String(status)) => status,
        Some(other) => {
            return Err(ClientError::data_format(format!(
                "'status' must be a string, got {}",
                json_kind(&other)
            )));
        }
        None => return Err(ClientError::data_format("missing 'status' key")),
    };

    let data = map.remove("data");
    let message = map.remove("message").map(|m| match m {
        Value::String(text) => text,
        other => other.to_string(),
    });

    if !is_success(&status) && message.is_none() {
        return Err(ClientError::data_format(
            "when not success, a 'message' key is needed",
        ));
    }

    Ok(Response {
        status,
        data,
        message,
        rest: map,
    })
}

fn check_keys(
    map: &Map<String, Value>,
    mode: ValidationMode,
    extra_allowed: &[&str],
) -> Result<(), ClientError> {
    let unexpected: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| !ALLOWED_KEYS.contains(k) && !extra_allowed.contains(k))
        .collect();

    if unexpected.is_empty() {
        return Ok(());
    }

    match mode {
        ValidationMode::Strict => Err(ClientError::data_format(format!(
            "unexpected key '{}'",
            unexpected.join("', '")
        ))),
        ValidationMode::Relaxed => {
            debug!(keys = ?unexpected, "Ignoring unknown keys in inbound frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pack(value: Value) -> Vec<u8> {
        rmp_serde::to_vec_named(&value).unwrap()
    }

    fn rejection(value: Value, mode: ValidationMode) -> String {
        match validate(&pack(value), mode) {
            Err(ClientError::DataFormat { message }) => message,
            other => panic!("expected data-format error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_frames_are_accepted() {
        let ok = validate(&pack(json!({"status": "success", "data": "zbl"})), ValidationMode::Relaxed)
            .unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.data(), Some(&json!("zbl")));

        let failed = validate(&pack(json!({"status": "fail", "message": "zbl"})), ValidationMode::Strict)
            .unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.message(), Some("zbl"));
    }

    #[test]
    fn test_status_is_case_insensitive() {
        for status in ["success", "Success", "SUCCESS"] {
            let r = validate(&pack(json!({"status": status, "data": 1})), ValidationMode::Relaxed)
                .unwrap();
            assert!(r.is_success(), "{status} should be success");
        }
        assert!(!is_success("succeeded"));
        assert!(!is_success(""));
    }

    #[test]
    fn test_missing_mandatory_fields_are_rejected() {
        assert!(rejection(json!({"zbl": "success"}), ValidationMode::Relaxed).contains("'status'"));
        assert!(rejection(json!({"status": "success"}), ValidationMode::Relaxed).contains("'data'"));
        assert!(rejection(json!({"status": "fail"}), ValidationMode::Relaxed).contains("'message'"));
        assert!(rejection(json!({"status": 1, "data": 1}), ValidationMode::Relaxed).contains("string"));
    }

    #[test]
    fn test_unknown_keys_depend_on_mode() {
        let frame = json!({"status": "success", "data": 1, "trace_id": "abc"});

        let relaxed = validate(&pack(frame.clone()), ValidationMode::Relaxed).unwrap();
        assert_eq!(relaxed.field("trace_id"), Some(&json!("abc")));

        assert!(rejection(frame, ValidationMode::Strict).contains("'trace_id'"));
    }

    #[test]
    fn test_extra_allowed_keys_pass_strict_mode() {
        let frame = pack(json!({"status": "success", "workload_typing": {}}));
        let err = validate(&frame, ValidationMode::Strict).unwrap_err();
        assert!(err.to_string().contains("'workload_typing'"));

        let r = validate_envelope(&frame, ValidationMode::Strict, &["workload_typing"]).unwrap();
        assert_eq!(r.field("workload_typing"), Some(&json!({})));
        assert!(r.data().is_none());
    }
}
