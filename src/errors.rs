use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Proposal or plan id does not resolve.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Caller is authenticated but may not touch this resource.
    Forbidden(String),
    /// Status change not allowed by the lifecycle table.
    InvalidTransition {
        /// Current status of the proposal.
        from: String,
        /// Requested status.
        to: String,
    },
    /// Store-level uniqueness violation on `proposal_number`.
    DuplicateProposalNumber(String),
    /// The proposal changed between read and write.
    ConcurrentModification(String),
    /// No proposal number could be assigned.
    AllocationFailure(String),
    /// Store timed out or the circuit breaker is open.
    StoreUnavailable(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Whether this error says something about the health of the backing store
    /// (as opposed to the request or the data).
    pub fn is_infrastructure(&self) -> bool {
        match self {
            AppError::DatabaseError(_) | AppError::StoreUnavailable(_) => true,
            AppError::WithContext { source, .. } => source.is_infrastructure(),
            _ => false,
        }
    }

    /// Strips `WithContext` wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::InvalidTransition { from, to } => {
                write!(f, "Invalid status transition: {} -> {}", from, to)
            }
            AppError::DuplicateProposalNumber(number) => {
                write!(f, "Duplicate proposal number: {}", number)
            }
            AppError::ConcurrentModification(msg) => write!(f, "Concurrent modification: {}", msg),
            AppError::AllocationFailure(msg) => write!(f, "Proposal number allocation failed: {}", msg),
            AppError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::Forbidden(msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, "Access denied".to_string())
            }
            AppError::InvalidTransition { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            AppError::DuplicateProposalNumber(_) | AppError::ConcurrentModification(_) => {
                tracing::warn!("Conflict: {}", self);
                (StatusCode::CONFLICT, self.to_string())
            }
            AppError::AllocationFailure(msg) => {
                tracing::error!("Allocation failure: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Could not assign a proposal number".to_string(),
                )
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage temporarily unavailable".to_string(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                return (**source).clone().into_response();
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl Clone for AppError {
    /// Clones the error.
    ///
    /// Note: `sqlx::Error` is not cloneable, so `DatabaseError` is simplified to `RowNotFound` during cloning.
    fn clone(&self) -> Self {
        match self {
            AppError::DatabaseError(_e) => AppError::DatabaseError(sqlx::Error::RowNotFound),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::Unauthorized(msg) => AppError::Unauthorized(msg.clone()),
            AppError::Forbidden(msg) => AppError::Forbidden(msg.clone()),
            AppError::InvalidTransition { from, to } => AppError::InvalidTransition {
                from: from.clone(),
                to: to.clone(),
            },
            AppError::DuplicateProposalNumber(n) => AppError::DuplicateProposalNumber(n.clone()),
            AppError::ConcurrentModification(msg) => AppError::ConcurrentModification(msg.clone()),
            AppError::AllocationFailure(msg) => AppError::AllocationFailure(msg.clone()),
            AppError::StoreUnavailable(msg) => AppError::StoreUnavailable(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalError(format!("Document (de)serialization failed: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::NotFound("p".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("b".into()), StatusCode::BAD_REQUEST),
            (AppError::Forbidden("f".into()), StatusCode::FORBIDDEN),
            (
                AppError::InvalidTransition {
                    from: "rejected".into(),
                    to: "approved".into(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::ConcurrentModification("x".into()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::AllocationFailure("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_context_delegates_to_source_status() {
        let err: Result<(), AppError> = Err(AppError::NotFound("proposal".into()));
        let wrapped = err.context("loading proposal").unwrap_err();

        assert!(matches!(wrapped.root(), AppError::NotFound(_)));
        assert_eq!(wrapped.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(AppError::StoreUnavailable("timeout".into()).is_infrastructure());
        assert!(AppError::DatabaseError(sqlx::Error::PoolTimedOut).is_infrastructure());
        assert!(!AppError::NotFound("x".into()).is_infrastructure());
        assert!(!AppError::ConcurrentModification("x".into()).is_infrastructure());
    }
}
