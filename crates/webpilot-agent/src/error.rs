use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// This crate's own contribution to the error taxonomy: everything the
/// Tool Set and CAPTCHA Handler raise directly, plus the browser and
/// shared-type errors they propagate through `?`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("tool argument error: {0}")]
    InvalidArguments(String),

    #[error("captcha could not be solved: {0}")]
    CaptchaUnsolvable(String),

    #[error(transparent)]
    Types(#[from] webpilot_types::Error),
}
