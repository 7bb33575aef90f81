/// Error Handling Module
///
/// One taxonomy for the whole service:
/// 1. Domain-specific error types (validation, store, auth, remote calls)
/// 2. The unified `AppError` used for control flow
/// 3. HTTP response mapping with structured logging
/// 4. Error context enrichment for logs

use actix_web::{error::ResponseError, http::header, http::StatusCode, HttpResponse};

use crate::security::CACHE_CONTROL_ALL_OFF;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Malformed input, rejected before any store is touched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(String),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
}

/// Failures reported by the credential and refresh-token stores
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unique constraint violated (username already taken)
    #[error("unique constraint violated")]
    Conflict,
    /// Any persistence failure; the message is for logs only
    #[error("store fault in {operation}: {message}")]
    Fault {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn fault(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Fault {
            operation,
            message: message.into(),
        }
    }
}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("credentials mismatch")]
    InvalidCredentials,
    #[error("invalid token")]
    TokenInvalid,
    #[error("missing authentication token")]
    MissingToken,
    /// Refresh token unknown, expired or already rotated
    #[error("refresh token rejected")]
    RefreshRejected,
    #[error("forbidden")]
    Forbidden,
}

/// Failures of calls across a network boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Worth one more attempt: transport failure, timeout or 5xx
    #[error("transient remote failure: {0}")]
    Transient(String),
    #[error("remote call failed: {0}")]
    Permanent(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("conflict")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppError::Conflict,
            fault => AppError::Store(fault),
        }
    }
}

impl From<RemoteError> for StoreError {
    fn from(err: RemoteError) -> Self {
        StoreError::fault("remote_call", err.to_string())
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

/// Map a sqlx error onto the store taxonomy
///
/// SQLSTATE 23505 is a unique violation, everything else is a fault.
pub fn store_error_from_sqlx(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict;
        }
    }
    StoreError::fault(operation, err.to_string())
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::Conflict => (StatusCode::CONFLICT, "CONFLICT", "Conflict".to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found".to_string()),
            // never expose the underlying cause
            AppError::Store(_) | AppError::Config(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", e.to_string())
                }
                AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID", e.to_string()),
                AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN", e.to_string()),
                AuthError::RefreshRejected => {
                    (StatusCode::UNAUTHORIZED, "REFRESH_REJECTED", e.to_string())
                }
                AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", e.to_string()),
            },
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::debug!(request_id = request_id, error = %e, "Validation error");
            }
            // expected user-triggered outcomes, not faults
            AppError::Conflict | AppError::NotFound => {
                tracing::debug!(request_id = request_id, error = %self, "Request outcome");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Store(e) => {
                tracing::error!(request_id = request_id, error = %e, "Store fault");
            }
            AppError::Config(msg) | AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status)
            .insert_header((header::CACHE_CONTROL, CACHE_CONTROL_ALL_OFF))
            .json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub subject_id: Option<i64>,
    pub operation: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            subject_id: None,
            operation: operation.into(),
        }
    }

    pub fn with_subject_id(mut self, subject_id: i64) -> Self {
        self.subject_id = Some(subject_id);
        self
    }
}
