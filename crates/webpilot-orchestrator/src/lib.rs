//! Decision Loop, Replay Engine, and the `HttpModelClient` that backs
//! both of them against a real language-model endpoint.

pub mod decision_loop;
pub mod error;
pub mod model;
pub mod replay;

pub use decision_loop::DecisionLoop;
pub use error::{Error, Result};
pub use model::HttpModelClient;
pub use replay::ReplayEngine;
