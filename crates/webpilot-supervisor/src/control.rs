//! Wire shapes for the bidirectional control channel. Server -> client
//! agent events reuse `webpilot_types::AgentEvent` verbatim since its own
//! `#[serde(tag = "type")]` already matches the wire vocabulary
//! (`step_update`, `captcha_detected`, `completion`, ...); only the
//! handshake-specific messages below are local to this crate.

use serde::{Deserialize, Serialize};
use webpilot_types::{AutomationId, RunId};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate {
        token: String,
    },
    StartAgent {
        #[serde(rename = "runId")]
        run_id: RunId,
    },
    StartScript {
        #[serde(rename = "automationId")]
        automation_id: AutomationId,
    },
    Heartbeat {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    Authentication {
        status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HandshakeMessage {
    pub fn success() -> Self {
        Self::Authentication {
            status: "success",
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Authentication {
            status: "failed",
            error: Some(error.into()),
        }
    }
}
