//! Shared types and error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::chain::address::AddressError;
use crate::chain::amount::AmountError;
use crate::chain::clvalue::ArgError;
use crate::chain::deploy::BuildError;
use crate::chain::quote::QuoteError;
use crate::chain::resolver::ResolutionError;
use crate::chain::signature::SignError;
use crate::chain::submit::SubmitError;

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream node error: {0}")]
    BadGateway(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl ApiError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY"),
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<AddressError> for ApiError {
    fn from(e: AddressError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<AmountError> for ApiError {
    fn from(e: AmountError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ArgError> for ApiError {
    fn from(e: ArgError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<BuildError> for ApiError {
    fn from(e: BuildError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<QuoteError> for ApiError {
    fn from(e: QuoteError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ResolutionError> for ApiError {
    fn from(e: ResolutionError) -> Self {
        match e {
            ResolutionError::UnknownLayout(_) => ApiError::Internal(e.to_string()),
            ResolutionError::NotAContract(_)
            | ResolutionError::ContractNotFound(_)
            | ResolutionError::NoEnabledVersions(_)
            | ResolutionError::DictionaryRootNotFound { .. } => ApiError::NotFound(e.to_string()),
            _ => ApiError::BadGateway(format!("could not read chain state: {}", e)),
        }
    }
}

impl From<SignError> for ApiError {
    fn from(e: SignError) -> Self {
        match e {
            SignError::Expired { .. } => ApiError::Conflict(e.to_string()),
            SignError::UnrecognizedSignatureFormat(_) => ApiError::BadRequest(e.to_string()),
            SignError::Signer(_) => ApiError::BadGateway(e.to_string()),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Timeout { .. } => ApiError::Timeout(e.to_string()),
            _ => ApiError::BadGateway(e.to_string()),
        }
    }
}
