//! Error handling for the storefront session.
//!
//! Provides a unified error handling system based on gRPC status codes,
//! with mapping from various underlying errors and HTTP status codes to
//! appropriate categories.
//!
//! # Error Categories
//!
//! Errors are categorized into standard types that map to HTTP status codes:
//! * Authentication/authorization failures (401, 403)
//! * Resource state (404, 409)
//! * Client errors (400, 429)
//! * Server errors (500, 501, 503)
//! * Timeouts and cancellation (499, 504)
//!
//! Authorization failures are special to the session: they are the
//! authoritative signal that a bearer token is no longer accepted by the
//! server. See [`Error::is_rejection`].
//!
//! # Example
//!
//! ```rust
//! use storefront_session::error::{Error, ErrorKind, Result};
//!
//! fn do_something() -> Result<()> {
//!     if condition {
//!         return Err(Error::unavailable("profile service is down"));
//!     }
//!
//!     // Convert from standard errors
//!     let file = std::fs::File::open("session.json")?;
//!
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type combining error kind and details.
///
/// Provides:
/// * Categorized error types ([`ErrorKind`])
/// * Underlying error details
/// * Conversion from common error types
/// * HTTP status code mapping
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Example
    /// ```
    /// use storefront_session::claims::MalformedTokenError;
    ///
    /// if let Some(e) = error.downcast::<MalformedTokenError>() {
    ///     println!("bad token: {e}");
    /// }
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether the server rejected the credentials used for the request.
    ///
    /// True for [`ErrorKind::Unauthenticated`] (401) and
    /// [`ErrorKind::PermissionDenied`] (403). A rejection of an
    /// authenticated call invalidates the session.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unauthenticated | ErrorKind::PermissionDenied
        )
    }
}

/// Standard result type for storefront session operations.
///
/// Wraps the standard `Result` type with our custom [`struct@Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// HTTP Mapping: 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// HTTP Mapping: 504 Gateway Timeout
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// HTTP Mapping: 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// HTTP Mapping: 409 Conflict
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// HTTP Mapping: 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// HTTP Mapping: 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// HTTP Mapping: 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// HTTP Mapping: 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// HTTP Mapping: 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// HTTP Mapping: 501 Not Implemented
    #[error("not implemented")]
    Unimplemented = 12,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// HTTP Mapping: 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// HTTP Mapping: 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

impl ErrorKind {
    /// Maps an HTTP status code onto an error category.
    ///
    /// Only meaningful for non-success statuses; anything that has no
    /// dedicated category becomes [`ErrorKind::Unknown`].
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        use ErrorKind::*;
        match status.as_u16() {
            400 => InvalidArgument,
            401 => Unauthenticated,
            403 => PermissionDenied,
            404 => NotFound,
            409 => AlreadyExists,
            429 => ResourceExhausted,
            499 => Cancelled,
            501 => Unimplemented,
            503 => Unavailable,
            504 => DeadlineExceeded,
            500..=599 => Internal,
            _ => Unknown,
        }
    }
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "user profile not found");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error from a non-success HTTP response status.
    ///
    /// The kind follows [`ErrorKind::from_status`]; the details carry the
    /// status line and, when the server sent one, its message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::from_status(StatusCode::UNAUTHORIZED, "expired");
    /// assert!(err.is_rejection());
    /// ```
    pub fn from_status(status: StatusCode, message: impl fmt::Display) -> Self {
        let message = message.to_string();
        let details = if message.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {message}")
        };
        Self::new(ErrorKind::from_status(status), details)
    }

    /// Creates an error for operations that were interrupted mid-execution.
    ///
    /// Maps to HTTP 409 Conflict. Use when an operation couldn't complete
    /// due to conflicting changes or state, such as a login response that
    /// was superseded by a newer login.
    pub fn aborted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Aborted, error)
    }


    /// Creates an error for data corruption or loss.
    ///
    /// Maps to HTTP 500 Internal Server Error.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }


    /// Creates an error for internal errors.
    ///
    /// Maps to HTTP 500 Internal Server Error.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for invalid arguments.
    ///
    /// Maps to HTTP 400 Bad Request.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }



    /// Creates an error for missing or invalid credentials.
    ///
    /// Maps to HTTP 401 Unauthorized.
    pub fn unauthenticated<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unauthenticated, error)
    }

    /// Creates an error for services that cannot be reached.
    ///
    /// Maps to HTTP 503 Service Unavailable.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for errors without a better category.
    ///
    /// Maps to HTTP 500 Internal Server Error.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.kind, self.error)
    }
}

/// Converts IO errors into appropriate error kinds.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind() {
            Io::NotFound => ErrorKind::NotFound,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::ConnectionRefused | Io::NotConnected | Io::AddrNotAvailable => {
                ErrorKind::Unavailable
            }
            Io::TimedOut => ErrorKind::DeadlineExceeded,
            Io::UnexpectedEof => ErrorKind::DataLoss,
            Io::InvalidInput | Io::InvalidData => ErrorKind::InvalidArgument,
            _ => ErrorKind::Unknown,
        };
        Self::new(kind, err)
    }
}

/// Converts HTTP client errors into appropriate error kinds.
///
/// Status errors keep the category of their status code, so that a 401
/// surfacing through `error_for_status` is still a rejection.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::new(ErrorKind::from_status(status), err);
        }

        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_connect() {
            return Self::unavailable(err);
        }

        if err.is_redirect() {
            return Self::new(ErrorKind::ResourceExhausted, err);
        }

        if err.is_timeout() {
            return Self::new(ErrorKind::DeadlineExceeded, err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors through IO error mapping.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

/// Converts configuration parse errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts invalid header errors to `Internal`.
impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts header size errors to `OutOfRange`-like `InvalidArgument`.
impl From<http::header::MaxSizeReached> for Error {
    fn from(e: http::header::MaxSizeReached) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts URL parsing errors to `Internal`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts poisoned lock errors to `Internal`.
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::internal(e.to_string())
    }
}
