use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::validation::ValidationErrors;

pub mod categories;
pub mod tasks;

/// JSON success envelope: `{success, message, data}`. `data` is present even
/// when null, matching the API contract.
pub fn success(data: impl Serialize, message: &str, status: StatusCode) -> Response {
    let data = match serde_json::to_value(data) {
        Ok(value) => value,
        Err(e) => {
            error!("failed to serialize response data: {}", e);
            Value::Null
        }
    };

    let body = json!({
        "success": true,
        "message": message,
        "data": data,
    });

    (status, Json(body)).into_response()
}

/// JSON error envelope: `{success, message}` plus `errors` when there are
/// field-level violations to report.
pub fn error(message: &str, errors: Option<ValidationErrors>, status: StatusCode) -> Response {
    let mut body = json!({
        "success": false,
        "message": message,
    });
    if let Some(errors) = errors {
        body["errors"] = json!(errors);
    }

    (status, Json(body)).into_response()
}
