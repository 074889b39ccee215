//! # Centralized Error Handling
//!
//! Every failure the thumbnail pipeline can produce is a [`ThumbError`]. The
//! type is `Clone` because one generation outcome is delivered to every caller
//! waiting on the same cache key.
//!
//! Converting an error into an HTTP response never yields a raw error page:
//! the body is always a placeholder image so gallery rendering keeps working.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::services::fallback::{FallbackReason, FallbackResolver, Placeholder};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThumbError {
    #[error("failed to decode source image: {0}")]
    DecodeFailed(String),

    #[error("invalid thumbnail dimensions: {0}")]
    DimensionsInvalid(String),

    #[error("failed to encode thumbnail: {0}")]
    EncodeFailed(String),

    #[error("failed to write thumbnail: {0}")]
    WriteFailed(String),

    #[error("thumbnail generation timed out")]
    GenerationTimeout,

    #[error("source file is missing: {0}")]
    SourceMissing(String),

    #[error("source file is corrupt: {0}")]
    SourceCorrupt(String),

    #[error("preview token is invalid")]
    TokenInvalid,

    #[error("bad request: {0}")]
    BadRequest(&'static str),
}

impl ThumbError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ThumbError::SourceMissing(_) | ThumbError::TokenInvalid => StatusCode::NOT_FOUND,
            ThumbError::DimensionsInvalid(_) | ThumbError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ThumbError::DecodeFailed(_) | ThumbError::SourceCorrupt(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ThumbError::GenerationTimeout => StatusCode::SERVICE_UNAVAILABLE,
            ThumbError::WriteFailed(_) | ThumbError::EncodeFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The fallback category this error falls into, if any.
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            ThumbError::SourceMissing(_) => Some(FallbackReason::SourceMissing),
            ThumbError::DecodeFailed(_) | ThumbError::SourceCorrupt(_) => {
                Some(FallbackReason::SourceCorrupt)
            }
            ThumbError::TokenInvalid => Some(FallbackReason::TokenInvalid),
            _ => None,
        }
    }

    pub fn placeholder(&self) -> &'static Placeholder {
        self.fallback_reason()
            .map(FallbackResolver::resolve)
            .unwrap_or(&Placeholder::GENERIC_PHOTO)
    }
}

impl IntoResponse for ThumbError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side failures are logged in full, client-side ones briefly
        if status.is_server_error() {
            error!(error = %self, "Thumbnail request failed");
        } else {
            warn!(error = %self, %status, "Serving placeholder");
        }

        let placeholder = self.placeholder();
        (
            status,
            [(header::CONTENT_TYPE, placeholder.content_type)],
            placeholder.bytes,
        )
            .into_response()
    }
}

/// Convenience Result type alias that uses ThumbError as the error type.
pub type ThumbResult<T> = Result<T, ThumbError>;
