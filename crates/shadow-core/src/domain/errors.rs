//! Domain error types
//!
//! This module defines the error taxonomy shared by the shadow document
//! model, the local store, the request handlers, and the sync handler.
//! Every variant maps to a stable wire code and message surfaced both in
//! direct replies and in `rejected` publishes.

use thiserror::Error;

/// Errors surfaced by the shadow document model and request handlers.
///
/// Each variant carries the numeric `code()` and `message` used on the
/// wire (see the rejected payload shape). Variants are grouped by the
/// error-handling kinds of the retry/backoff design: validation,
/// authorization, resource, concurrency, and rate errors are never
/// retried by the local handlers; `ServiceError` is the catch-all for
/// local I/O and rate failures surfaced to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShadowError {
    /// Malformed or out-of-range arguments (thing/shadow name, page size).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The authorization collaborator denied the request.
    #[error("unauthorized")]
    Unauthorized,

    /// No shadow document exists for the given key.
    #[error("resource not found")]
    ResourceNotFound,

    /// The patch's `version` did not equal `current + 1`.
    #[error("version conflict: expected {expected}, got {actual}")]
    VersionConflict {
        /// The version the store expected (`current + 1`).
        expected: u64,
        /// The version presented in the patch.
        actual: u64,
    },

    /// The update payload exceeded `shadowDocumentSizeLimitBytes`.
    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload in bytes.
        size: usize,
        /// The configured limit.
        limit: usize,
    },

    /// The payload failed to parse as JSON or violated the patch schema.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Inbound rate limit exceeded for this thing or in aggregate.
    #[error("throttled")]
    Throttled,

    /// Local I/O, rate limiting surfaced to a caller, or any other
    /// failure that is not one of the more specific variants above.
    #[error("service error: {0}")]
    ServiceError(String),
}

impl ShadowError {
    /// Stable small-integer code carried on the wire in rejected payloads.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidArguments(_) => 400,
            Self::Unauthorized => 401,
            Self::ResourceNotFound => 404,
            Self::VersionConflict { .. } => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::InvalidPayload(_) => 400,
            Self::Throttled => 429,
            Self::ServiceError(_) => 500,
        }
    }
}

/// Errors returned by the cloud data-plane client and classified by the
/// sync handler's retry policy (see the sync engine's `with_retry`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CloudError {
    /// The cloud shadow service rejected the request as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The cloud side reports no document for this key.
    #[error("not found")]
    NotFound,

    /// The cloud side rejected the write due to a version mismatch.
    #[error("conflict")]
    Conflict,

    /// Caller is not authorized against the cloud data plane.
    #[error("unauthorized")]
    Unauthorized,

    /// The cloud side does not support the attempted method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The cloud side rejected the payload's content-encoding.
    #[error("unsupported encoding")]
    UnsupportedEncoding,

    /// The cloud side rejected the payload as too large.
    #[error("request entity too large")]
    RequestEntityTooLarge,

    /// The cloud side is temporarily unavailable; retryable.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// The cloud side is throttling this caller; retryable.
    #[error("throttling")]
    Throttling,

    /// The cloud side reported an internal failure; retryable.
    #[error("internal failure")]
    InternalFailure,

    /// The call did not complete within the configured timeout; retryable.
    #[error("timeout")]
    Timeout,

    /// An MQTT subscribe/unsubscribe/publish call timed out.
    #[error("subscription timeout")]
    SubscriptionTimeout,

    /// An MQTT operation failed to execute (connection dropped, etc).
    #[error("subscription execution error: {0}")]
    SubscriptionExecution(String),

    /// Any other client-side (4xx-equivalent) error; terminal, not retried.
    #[error("client error: {0}")]
    Client(String),
}

impl CloudError {
    /// True for errors the sync handler retries with exponential backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable | Self::Throttling | Self::InternalFailure | Self::Timeout
        )
    }

    /// True for errors the subscription-reconciliation task retries.
    #[must_use]
    pub fn is_subscription_retryable(&self) -> bool {
        matches!(self, Self::SubscriptionTimeout | Self::SubscriptionExecution(_))
    }

    /// True for errors that should drop the request without blocking
    /// the queue (terminal upstream errors).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::Unauthorized
                | Self::MethodNotAllowed
                | Self::UnsupportedEncoding
                | Self::RequestEntityTooLarge
                | Self::Client(_)
        )
    }
}

/// Errors surfaced by the local store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The underlying SQLite I/O failed.
    #[error("data error: {0}")]
    DataError(String),

    /// `maxDiskUtilizationMegaBytes` would be exceeded by this write.
    #[error("disk quota exceeded")]
    QuotaExceeded,
}

impl From<StoreError> for ShadowError {
    fn from(err: StoreError) -> Self {
        ShadowError::ServiceError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ShadowError::Unauthorized.code(), 401);
        assert_eq!(ShadowError::ResourceNotFound.code(), 404);
        assert_eq!(
            ShadowError::VersionConflict { expected: 2, actual: 5 }.code(),
            409
        );
        assert_eq!(ShadowError::Throttled.code(), 429);
    }

    #[test]
    fn test_cloud_error_classification() {
        assert!(CloudError::Throttling.is_transient());
        assert!(CloudError::Timeout.is_transient());
        assert!(!CloudError::InvalidRequest("bad".into()).is_transient());
        assert!(CloudError::InvalidRequest("bad".into()).is_terminal());
        assert!(!CloudError::Conflict.is_terminal());
        assert!(!CloudError::Conflict.is_transient());
    }

    #[test]
    fn test_store_error_maps_to_service_error() {
        let err: ShadowError = StoreError::DataError("disk full".into()).into();
        assert_eq!(err.code(), 500);
    }
}
