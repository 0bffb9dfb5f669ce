use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the binary entrypoint itself (config/CLI layer) -
/// everything below this surfaces as each library crate's own `Error`
/// type instead, matching this crate's convention of one `thiserror`
/// enum per crate rather than a single shared error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] webpilot_orchestrator::Error),
}
