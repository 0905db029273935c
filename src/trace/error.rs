use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// The request cannot be executed as given (bad scheme, missing host...).
    #[error("Request construction error: {0}")]
    RequestConstruction(String),

    /// A tracer times exactly one request.
    #[error("Tracer is already bound to a request")]
    AlreadyBound,

    /// The terminal event has not fired, usually because the response body was
    /// not fully drained and released.
    #[error("Incomplete trace: the response body was not drained and released")]
    Incomplete,
}
