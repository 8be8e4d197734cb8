//! Uniform response envelopes and status mapping.

use crate::route::RouteError;
use plinth_kernel::DispatchError;
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// `{"status": "success", "result": ...}`
    pub fn success(result: Value) -> Self {
        Self::ok(json!({ "status": "success", "result": result }))
    }

    /// `{"status": "error", "error": {"kind", "message"}}`
    pub fn error(status: u16, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({
                "status": "error",
                "error": { "kind": kind, "message": message.into() },
            }),
        }
    }

    /// Render a dispatch failure. Validation failures carry per-field
    /// detail under `error.fields`.
    pub fn from_dispatch(err: &DispatchError) -> Self {
        let mut response = Self::error(status_for(err), err.kind(), err.to_string());
        let detail = match err {
            DispatchError::Validation(validation) => Some(("fields", json!(validation.errors))),
            DispatchError::Runtime(handler) => handler.detail.clone().map(|d| ("detail", d)),
            _ => None,
        };
        if let Some((key, value)) = detail
            && let Some(error) = response.body.get_mut("error").and_then(Value::as_object_mut)
        {
            error.insert(key.to_string(), value);
        }
        response
    }

    pub fn from_route(err: &RouteError) -> Self {
        match err {
            RouteError::BadRequest(_) => Self::error(400, "bad_request", err.to_string()),
            RouteError::NotFound(_) => Self::error(404, "not_found", err.to_string()),
            RouteError::MethodNotAllowed { .. } => {
                Self::error(405, "method_not_allowed", err.to_string())
            }
            RouteError::LengthRequired(_) => Self::error(411, "length_required", err.to_string()),
            RouteError::PayloadTooLarge { .. } => {
                Self::error(413, "payload_too_large", err.to_string())
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn status_for(err: &DispatchError) -> u16 {
    match err {
        DispatchError::NotFound(_) => 404,
        DispatchError::Validation(_) => 422,
        DispatchError::Runtime(_) | DispatchError::Resource(_) | DispatchError::Bridge(_) => 500,
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_kernel::{HandlerError, ValidationError};

    #[test]
    fn validation_errors_carry_fields() {
        let err =
            DispatchError::Validation(ValidationError::single("a", "expected int, got \"ten\""));
        let response = HttpResponse::from_dispatch(&err);
        assert_eq!(response.status, 422);
        assert_eq!(response.body["status"], "error");
        assert_eq!(response.body["error"]["kind"], "validation");
        assert_eq!(response.body["error"]["fields"][0]["field"], "a");
    }

    #[test]
    fn runtime_detail_is_passed_through() {
        let handler = HandlerError::new("out of stock").with_detail(json!({"sku": 7}));
        let err = DispatchError::Runtime(handler);
        let response = HttpResponse::from_dispatch(&err);
        assert_eq!(response.status, 500);
        assert_eq!(response.body["error"]["message"], "out of stock");
        assert_eq!(response.body["error"]["detail"]["sku"], 7);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = HttpResponse::from_dispatch(&DispatchError::NotFound("calc.mul".into()));
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert!(HttpResponse::success(json!(30)).is_success());
    }

    #[test]
    fn body_framing_errors_keep_their_status() {
        let response = HttpResponse::from_route(&RouteError::PayloadTooLarge { limit: 16 });
        assert_eq!(response.status, 413);
        assert_eq!(response.body["error"]["kind"], "payload_too_large");
        assert_eq!(reason_phrase(response.status), "Payload Too Large");

        let response = HttpResponse::from_route(&RouteError::LengthRequired("chunked".into()));
        assert_eq!(response.status, 411);
        assert_eq!(reason_phrase(response.status), "Length Required");
    }
}
