//! Error types for admission control
use crate::binding::BindingError;
use http::{HeaderMap, Response, StatusCode};
use std::fmt;

/// Message carried by the default rejections.
pub const TOO_MANY_REQUESTS: &str = "Too Many Requests";

/// A deliberate terminal response produced by an error handler.
///
/// Not a crash: the middleware returns it as [`AdmissionError::Rejected`] so the host can render
/// it, typically through [`Rejection::into_response`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl Rejection {
    /// Build a rejection with an arbitrary status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), headers: HeaderMap::new() }
    }

    /// 429 "Too Many Requests" with no headers.
    pub fn too_many_requests() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS)
    }

    /// Attach headers, replacing any previously attached values for the same names.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Fold in headers an error handler queued on the request context. Headers attached to the
    /// rejection itself take precedence.
    pub(crate) fn with_queued_headers(mut self, mut queued: HeaderMap) -> Self {
        queued.extend(std::mem::take(&mut self.headers));
        self.headers = queued;
        self
    }

    /// Status code of the terminal response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Human-readable message, used as the response body.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Headers attached to the terminal response.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Render as an HTTP response whose body is the message.
    pub fn into_response<B>(self) -> Response<B>
    where
        B: From<String>,
    {
        let mut response = Response::new(B::from(self.message));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

/// Failure talking to a limiter service or key-value store.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// In-process backend state was poisoned by a panicking writer.
    #[error("backend state lock poisoned")]
    Poisoned,
    /// Any other backend-specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Unified error returned by the admission middleware.
#[derive(Debug)]
pub enum AdmissionError<E> {
    /// The request was refused by the active strategy's error handler.
    Rejected(Rejection),
    /// The configured binding was missing or lacked the required capability.
    Binding(BindingError),
    /// The limiter service or store failed while deciding.
    Backend(BackendError),
    /// The wrapped service failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(rejection) => write!(f, "request rejected: {}", rejection),
            Self::Binding(e) => write!(f, "binding misconfigured: {}", e),
            Self::Backend(e) => write!(f, "rate limit backend failed: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Binding(e) => Some(e),
            Self::Backend(e) => Some(e),
            Self::Inner(e) => Some(e),
            Self::Rejected(_) => None,
        }
    }
}

impl<E> AdmissionError<E> {
    /// Check if the request was rate limited.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
    /// Check if this is a binding-usage error.
    pub fn is_binding(&self) -> bool {
        matches!(self, Self::Binding(_))
    }
    /// Check if the backend failed.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Borrow the rejection if present.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
    /// Borrow the binding error if present.
    pub fn binding_error(&self) -> Option<&BindingError> {
        match self {
            Self::Binding(e) => Some(e),
            _ => None,
        }
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Render admission failures as HTTP responses.
    ///
    /// Rejections keep their status, headers, and message. Binding and backend failures become
    /// 500s. Inner errors are handed back untouched since only the host knows how to render them.
    pub fn into_response<B>(self) -> Result<Response<B>, E>
    where
        B: From<String>,
    {
        match self {
            Self::Rejected(rejection) => Ok(rejection.into_response()),
            Self::Binding(e) => Ok(internal_error(e.to_string())),
            Self::Backend(e) => Ok(internal_error(e.to_string())),
            Self::Inner(e) => Err(e),
        }
    }
}

fn internal_error<B: From<String>>(message: String) -> Response<B> {
    let mut response = Response::new(B::from(message));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

impl<E> From<Rejection> for AdmissionError<E> {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

impl<E> From<BindingError> for AdmissionError<E> {
    fn from(e: BindingError) -> Self {
        Self::Binding(e)
    }
}

impl<E> From<BackendError> for AdmissionError<E> {
    fn from(e: BackendError) -> Self {
        Self::Backend(e)
    }
}
