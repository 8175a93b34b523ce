use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::assignment::OfferStatus;
use crate::models::load::Stage;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("caller is not the assigned driver")]
    NotAssignedDriver,

    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("missing payload: {0}")]
    MissingPayload(String),

    #[error("load already has a pending offer")]
    OfferConflict,

    #[error("assignment already resolved as {0:?}")]
    AlreadyResolved(OfferStatus),

    #[error("offer window has expired")]
    Expired,

    #[error("load is not in an en-route stage")]
    LoadNotTrackable(Stage),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::MissingPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) | AppError::NotAssignedDriver => StatusCode::FORBIDDEN,
            AppError::InvalidTransition { .. }
            | AppError::OfferConflict
            | AppError::AlreadyResolved(_)
            | AppError::LoadNotTrackable(_) => StatusCode::CONFLICT,
            AppError::Expired => StatusCode::GONE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
