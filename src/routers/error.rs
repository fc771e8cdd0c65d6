//! HTTP error responses shared by both translators.
//!
//! Body shapes are part of the compatibility surface: the 401 uses the
//! `{code, errmsg}` form, everything else `{error}`. Blocking-mode 500s
//! stay generic while streaming mode surfaces the backend message
//! inline; the asymmetry is intentional and must not be unified.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
struct AuthErrorBody {
    code: u16,
    errmsg: &'static str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Missing or empty bearer token. Issued before any backend call.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(AuthErrorBody {
            code: 401,
            errmsg: "Unauthorized.",
        }),
    )
        .into_response()
}

pub fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
}

pub fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: message }),
    )
        .into_response()
}

/// Blocking-mode failure body. The backend's own message is logged,
/// never transmitted here.
pub fn generic_internal_error() -> Response {
    internal_error("An error occurred while processing the request.")
}

/// The backend stream ended without a terminal event and without an
/// explicit error event.
pub fn unexpected_end_of_stream() -> Response {
    internal_error("Unexpected end of stream.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_body_shape() {
        let response = unauthorized();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_errors_are_500() {
        assert_eq!(
            generic_internal_error().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            unexpected_end_of_stream().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
