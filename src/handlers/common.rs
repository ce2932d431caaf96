use crate::errors::{ApiError, ServiceError};
use axum::{
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Serialize;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Map service errors to API errors
pub fn map_service_error(err: ServiceError) -> ApiError {
    ApiError::ServiceError(err)
}

/// Unwraps a form body, turning an unparsable one into a 400.
pub fn form_body<T>(body: Result<Form<T>, FormRejection>) -> Result<T, ApiError> {
    body.map(|Form(value)| value).map_err(|rejection| ApiError::BadRequest {
        message: rejection.body_text(),
        error_code: Some("INVALID_FORM".to_string()),
    })
}

/// Unwraps a JSON body, turning an unparsable one into a 400.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| ApiError::BadRequest {
        message: rejection.body_text(),
        error_code: Some("INVALID_JSON".to_string()),
    })
}
