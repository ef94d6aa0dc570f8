use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::{ErrorResponse, HealthResponse};

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

pub fn json_ok_response() -> Response {
    Json(HealthResponse { status: "ok" }).into_response()
}
