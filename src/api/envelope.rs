use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    error::{ApiError, FieldErrors},
    models::{Kind, Record},
};

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// Empty, or diagnostic lines for a 500.
    Lines(Vec<String>),
    Fields(FieldErrors),
}

/// The body every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub error_code: u16,
    pub message: String,
    pub data: Vec<Record>,
    pub error: ErrorDetail,
}

/// An envelope paired with the HTTP status it is sent with.
#[derive(Debug)]
pub struct AppMessage {
    status: StatusCode,
    body: Envelope,
}

impl AppMessage {
    fn new(status: StatusCode, message: impl Into<String>, data: Vec<Record>, error: ErrorDetail) -> Self {
        AppMessage {
            status,
            body: Envelope {
                error_code: status.as_u16(),
                message: message.into(),
                data,
                error,
            },
        }
    }

    pub fn found(record: Record) -> Self {
        let message = format!("{} found", record.kind.label());
        Self::new(StatusCode::OK, message, vec![record], ErrorDetail::Lines(vec![]))
    }

    pub fn listed(records: Vec<Record>) -> Self {
        Self::new(StatusCode::OK, "Data found", records, ErrorDetail::Lines(vec![]))
    }

    pub fn created(record: Record) -> Self {
        let message = format!("{} created successfully", record.kind.label());
        Self::new(StatusCode::CREATED, message, vec![record], ErrorDetail::Lines(vec![]))
    }

    pub fn updated(record: Record) -> Self {
        let message = format!("{} updated successfully", record.kind.label());
        Self::new(StatusCode::OK, message, vec![record], ErrorDetail::Lines(vec![]))
    }

    pub fn deleted(kind: Kind) -> Self {
        let message = format!("{} deleted successfully", kind.label());
        Self::new(StatusCode::OK, message, vec![], ErrorDetail::Lines(vec![]))
    }

    /// Shape a failure. Diagnostic lines are only exposed with `debug`.
    pub fn new_error(err: ApiError, debug: bool) -> Self {
        let status = err.status();
        match err {
            ApiError::NotFound(kind) => {
                log::error!("{} not found", kind.label());
                Self::new(status, format!("{} not found", kind.label()), vec![], ErrorDetail::Lines(vec![]))
            }
            ApiError::UnknownResource(name) => {
                log::error!("unknown resource {:?}", name);
                Self::new(status, "Resource not found", vec![], ErrorDetail::Lines(vec![]))
            }
            ApiError::Validation(errors) => {
                log::error!("validation failed: {:?}", errors);
                Self::new(status, "Validation failed", vec![], ErrorDetail::Fields(errors))
            }
            ApiError::EmptyCollection(kind) => {
                log::warn!("no {} found", kind.label());
                Self::new(status, "No data found", vec![], ErrorDetail::Lines(vec![]))
            }
            ApiError::MethodNotAllowed => {
                Self::new(status, "Method not allowed", vec![], ErrorDetail::Lines(vec![]))
            }
            ApiError::Body(rejection) => {
                log::error!("request body rejected: {}", rejection);
                let message = status.canonical_reason().unwrap_or("Bad Request");
                Self::new(status, message, vec![], ErrorDetail::Lines(vec![rejection.body_text()]))
            }
            ApiError::Internal(err) => {
                log::error!("Internal Server Error: {:#}", err);
                let trace = if debug {
                    format!("{:?}", err).lines().map(str::to_string).collect()
                } else {
                    vec![]
                };
                Self::new(status, "Internal Server Error", vec![], ErrorDetail::Lines(trace))
            }
        }
    }

    /// 500 envelope for a handler that panicked.
    pub fn from_panic(panic: Box<dyn Any + Send + 'static>, debug: bool) -> Self {
        let detail = panic
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "handler panicked".to_string());
        Self::new_error(ApiError::Internal(anyhow::anyhow!(detail)), debug)
    }

}

#[cfg(test)]
impl AppMessage {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Envelope {
        &self.body
    }
}

impl IntoResponse for AppMessage {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
