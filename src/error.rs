use std::collections::BTreeMap;

use axum::{extract::rejection::BytesRejection, http::StatusCode};
use thiserror::Error;

use crate::models::Kind;

/// Field name to the list of problems found with it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{} not found", .0.label())]
    NotFound(Kind),

    #[error("unknown resource `{0}`")]
    UnknownResource(String),

    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("no {} rows", .0.label())]
    EmptyCollection(Kind),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Body(#[from] BytesRejection),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) | ApiError::UnknownResource(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::EmptyCollection(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Single-field validation failure.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.into(), vec![message.into()]);
        ApiError::Validation(errors)
    }
}
