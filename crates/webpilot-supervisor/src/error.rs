use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// This crate's own contribution to the error taxonomy: the Supervisor
/// itself never raises anything directly, only propagates what the
/// Decision Loop, Replay Engine, and shared plumbing it calls through
/// raise.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Orchestrator(#[from] webpilot_orchestrator::Error),

    #[error(transparent)]
    Types(#[from] webpilot_types::Error),
}
