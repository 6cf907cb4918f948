//! Error types for Trellis.
//!
//! Every failure is local to one request. The variants follow the stages
//! at which a request can fail:
//!
//! | Variant | Raised by | Status |
//! |---|---|---|
//! | `RouteNotFound` | dispatcher lookup | 404 |
//! | `ContextInit` | context construction, init hook | 400 |
//! | `AuthDenied` | gatekeeper | 401 |
//! | `Handler` | any chain stage | 500 |
//! | `SubTask` | forked task, merged at join | 500 |
//! | `Cancelled` | forked task aborted by the runtime | 503 |
//! | `Combined` | join with an earlier pipeline error | primary's |

use http::{Method, StatusCode};
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Standard error type for Trellis.
///
/// # Example
///
/// ```
/// use trellis_core::Error;
///
/// fn check(token: &str) -> Result<(), Error> {
///     if token.is_empty() {
///         return Err(Error::handler("missing token"));
///     }
///     Ok(())
/// }
///
/// assert_eq!(check("").unwrap_err().status_code().as_u16(), 500);
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Neither the trie nor the pattern table matched.
    #[error("not found: {method} {path}")]
    RouteNotFound {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },

    /// Per-request state could not be built.
    #[error("context init failed: {0}")]
    ContextInit(String),

    /// The gatekeeper rejected the request.
    #[error("access denied")]
    AuthDenied {
        /// Value for the `WWW-Authenticate` header.
        challenge: String,
    },

    /// A chain stage failed.
    #[error("{message}")]
    Handler {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// A forked sub-task failed.
    #[error("sub-task failed: {0}")]
    SubTask(#[source] Box<Error>),

    /// A forked sub-task was cancelled before it finished.
    #[error("sub-task cancelled")]
    Cancelled,

    /// Two failures from the same request; the first one wins.
    #[error("{primary}; additionally: {secondary}")]
    Combined {
        /// The error that was seen first.
        #[source]
        primary: Box<Error>,
        /// Rendering of the later error.
        secondary: String,
    },
}

impl Error {
    /// Creates a handler error from a message.
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a handler error wrapping `source`.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Handler {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a context construction error.
    #[must_use]
    pub fn context_init(message: impl Into<String>) -> Self {
        Self::ContextInit(message.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(method: Method, path: impl Into<String>) -> Self {
        Self::RouteNotFound {
            method,
            path: path.into(),
        }
    }

    /// Merges two optional errors. The first one stays primary and the
    /// second is attached as context.
    #[must_use]
    pub fn combine(first: Option<Error>, second: Option<Error>) -> Option<Error> {
        match (first, second) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e),
            (Some(primary), Some(secondary)) => Some(Self::Combined {
                primary: Box::new(primary),
                secondary: secondary.to_string(),
            }),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ContextInit(_) => StatusCode::BAD_REQUEST,
            Self::AuthDenied { .. } => StatusCode::UNAUTHORIZED,
            Self::Handler { .. } | Self::SubTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Combined { primary, .. } => primary.status_code(),
        }
    }

    /// Returns true for [`Error::RouteNotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RouteNotFound { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Handler {
            message: err.to_string(),
            source: Some(err.into()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::with_source("I/O error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::not_found(Method::GET, "/x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(Error::context_init("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::AuthDenied {
                challenge: "Basic".into()
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::handler("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::Cancelled.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::handler("boom").to_string(), "boom");
        assert_eq!(
            Error::not_found(Method::POST, "/a").to_string(),
            "not found: POST /a"
        );
        assert_eq!(
            Error::SubTask(Box::new(Error::handler("io"))).to_string(),
            "sub-task failed: io"
        );
    }

    #[test]
    fn test_combine_first_wins() {
        let combined =
            Error::combine(Some(Error::handler("first")), Some(Error::handler("second"))).unwrap();

        assert_eq!(combined.to_string(), "first; additionally: second");
        match &combined {
            Error::Combined { primary, .. } => assert_eq!(primary.to_string(), "first"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(combined.source().unwrap().to_string(), "first");
    }

    #[test]
    fn test_combine_single_sides() {
        assert!(Error::combine(None, None).is_none());
        let left = Error::combine(Some(Error::handler("l")), None).unwrap();
        assert_eq!(left.to_string(), "l");
        let right = Error::combine(None, Some(Error::handler("r"))).unwrap();
        assert_eq!(right.to_string(), "r");
    }

    #[test]
    fn test_combined_status_follows_primary() {
        let combined = Error::combine(
            Some(Error::context_init("bad query")),
            Some(Error::handler("later")),
        )
        .unwrap();
        assert_eq!(combined.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_from_anyhow_keeps_source() {
        let err: Error = anyhow::anyhow!("db down").into();
        assert_eq!(err.to_string(), "db down");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = Error::with_source("write failed", io);
        assert_eq!(err.source().unwrap().to_string(), "disk");
    }
}
