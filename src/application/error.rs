use std::error::Error as StdError;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{releases::ReleaseError, syndication::SyndicationError},
    infra::error::InfraError,
};

/// Cache policy sent with 404 responses so edge caches absorb repeat misses.
pub const NOT_FOUND_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: String,
    cache_control: Option<&'static str>,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message: public_message.into(),
            cache_control: None,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message: public_message.into(),
            cache_control: None,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn with_cache_control(mut self, value: &'static str) -> Self {
        self.cache_control = Some(value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        if let Some(value) = self.cache_control {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, header::HeaderValue::from_static(value));
        }
        self.report.attach(&mut response);
        response
    }
}

impl From<ReleaseError> for HttpError {
    fn from(error: ReleaseError) -> Self {
        const SOURCE: &str = "application::error::release_error_to_http_error";
        match &error {
            ReleaseError::NotFound { .. } => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, error.to_string(), &error)
                    .with_cache_control(NOT_FOUND_CACHE_CONTROL)
            }
            ReleaseError::InvalidFilter(_) => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, error.to_string(), &error)
            }
            ReleaseError::Upstream(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_GATEWAY,
                "Book catalog unavailable",
                &error,
            ),
        }
    }
}

impl From<SyndicationError> for HttpError {
    fn from(error: SyndicationError) -> Self {
        HttpError::from_error(
            "application::error::syndication_error_to_http_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Feed could not be encoded",
            &error,
        )
    }
}

/// Start-up and command-level failures.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error(transparent)]
    Syndication(#[from] SyndicationError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
