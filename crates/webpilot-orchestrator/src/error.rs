use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// This crate's own contribution to the error taxonomy: everything the
/// Decision Loop and Replay Engine raise directly, plus the errors they
/// propagate from the browser, the Tool Set, and the shared types crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("max steps exceeded ({0})")]
    MaxStepsExceeded(usize),

    #[error(transparent)]
    Agent(#[from] webpilot_agent::Error),

    #[error(transparent)]
    Types(#[from] webpilot_types::Error),
}
