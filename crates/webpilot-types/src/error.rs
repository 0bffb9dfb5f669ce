use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the `ModelClient`, `StoreAdapter`, `AuthVerifier`, and
/// `EventSink` traits themselves. These are implemented across crate
/// boundaries and consumed as `Arc<dyn Trait>`, so their fallible methods
/// need one concrete error type regardless of which crate supplies the
/// implementation; each crate that calls through a trait object converts
/// this into its own error type with `#[from]`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("language model error: {0}")]
    Model(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}
