//! Shared data model and capability traits for the webpilot orchestration
//! engine: the Run/Step/Trace/Automation entities, the Store Adapter and
//! Auth Verifier capability contracts, and the language-model client
//! trait that the Decision Loop, Replay Engine, and CAPTCHA Handler all
//! dispatch through.

pub mod auth;
pub mod automation;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod run;
pub mod store;
pub mod trace;

pub use auth::{AuthVerifier, JwtAuthVerifier};
pub use automation::Automation;
pub use error::{Error, Result};
pub use events::{AgentEvent, EventSink, StdoutSink};
pub use ids::{AutomationId, RunId, SessionId, UserId};
pub use model::{Conversation, ModelClient, ModelTurn, Role, ToolSchema, Turn};
pub use run::{Run, RunStatus, Step};
pub use store::{InMemoryStore, StoreAdapter};
pub use trace::{Command, Trace};
