//! Response classification
//!
//! Turns one HTTP exchange into an [`Attempt`]: the API answers
//! `{"isError": bool, "name": "...", "message": "..."}` with status 200, and
//! signals throttling either with HTTP 429 or with an error message that
//! mentions the rate limit.

use reqwest::StatusCode;
use serde_json::Value;

/// Outcome of a single request, before retry decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Name extracted from a well-formed payload
    Success(String),

    /// The service asked us to slow down
    RateLimited(String),

    /// Connection, timeout or transfer problem worth retrying
    Transient(String),

    /// Terminal for this run
    Failed(String),
}

/// Classifies a response that has a status line
///
/// `body` is only inspected for HTTP 200.
pub fn classify_response(status: StatusCode, body: &str, name_field: &str) -> Attempt {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Attempt::RateLimited(format!("HTTP {}", status.as_u16()));
    }

    if status != StatusCode::OK {
        return Attempt::Failed(format!("HTTP {}", status.as_u16()));
    }

    classify_payload(body, name_field)
}

/// Classifies the JSON body of an HTTP 200 response
pub fn classify_payload(body: &str, name_field: &str) -> Attempt {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return Attempt::Failed(format!("Malformed response: {}", e)),
    };

    let is_error = value.get("isError").and_then(Value::as_bool);
    let message = value.get("message").and_then(Value::as_str);

    if is_error == Some(false) {
        if let Some(name) = value.get(name_field).and_then(scalar_name) {
            return Attempt::Success(name);
        }
    }

    if is_error == Some(true) {
        if let Some(msg) = message.filter(|m| is_rate_limit_message(m)) {
            return Attempt::RateLimited(msg.to_string());
        }
    }

    Attempt::Failed(message.unwrap_or("API returned error").to_string())
}

/// Strings are taken as-is; numbers and booleans use their JSON text
fn scalar_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

fn is_rate_limit_message(message: &str) -> bool {
    message.to_lowercase().contains("rate")
}
