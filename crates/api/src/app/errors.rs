use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use dropshop_core::DomainError;

/// Map an engine error onto the HTTP surface.
///
/// The status code is this layer's decision; the stable machine identifier
/// in the body comes from [`DomainError::code`].
pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::Ownership => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::OutOfStock
        | DomainError::DuplicateReservation
        | DomainError::TransientConflict(_) => StatusCode::CONFLICT,
        DomainError::ReservationNotActive | DomainError::ReservationExpired => StatusCode::GONE,
        DomainError::LedgerOverrun(_) | DomainError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(code = err.code(), error = %err, "internal error serving request");
    }

    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
