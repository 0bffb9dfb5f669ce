use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{AutomationId, RunId};
use crate::run::{RunStatus, Step};

/// Which run this event belongs to - a live Decision Loop carries a
/// `RunId`, a Replay Engine carries an `AutomationId`. Flattened onto
/// the event so the wire shape carries exactly one of `runId` or
/// `automationId`, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventContext {
    Run {
        #[serde(rename = "runId")]
        run_id: RunId,
    },
    Automation {
        #[serde(rename = "automationId")]
        automation_id: AutomationId,
    },
}

impl From<RunId> for EventContext {
    fn from(run_id: RunId) -> Self {
        Self::Run { run_id }
    }
}

impl From<AutomationId> for EventContext {
    fn from(automation_id: AutomationId) -> Self {
        Self::Automation { automation_id }
    }
}

/// Everything the Decision Loop, the Replay Engine, and the CAPTCHA
/// Handler emit toward a session's client. Owned by the Supervisor; the
/// loop/engine receive a sink by construction and never hold a transport
/// handle themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "step_update")]
    StepUpdate { step: Step },
    #[serde(rename = "step_started")]
    StepStarted { number: u32 },
    #[serde(rename = "step_completed")]
    StepCompleted { number: u32 },
    #[serde(rename = "screenshot_update")]
    ScreenshotUpdate {
        #[serde(flatten)]
        context: EventContext,
        #[serde(with = "base64_bytes")]
        screenshot: Vec<u8>,
    },
    #[serde(rename = "captcha_detected")]
    CaptchaDetected,
    #[serde(rename = "captcha_solved")]
    CaptchaSolved,
    #[serde(rename = "completion")]
    Completion {
        #[serde(with = "status_lowercase")]
        status: RunStatus,
        #[serde(rename = "finalAnswer")]
        final_answer: Option<String>,
    },
    #[serde(rename = "error")]
    Error { error: String },
}

mod status_lowercase {
    use super::RunStatus;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &RunStatus, s: S) -> std::result::Result<S::Ok, S::Error> {
        let lower = match status {
            RunStatus::Pending => "pending",
            RunStatus::Inprogress => "inprogress",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
        };
        s.serialize_str(lower)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<RunStatus, D::Error> {
        let s = String::deserialize(d)?;
        match s.as_str() {
            "pending" => Ok(RunStatus::Pending),
            "inprogress" => Ok(RunStatus::Inprogress),
            "failed" => Ok(RunStatus::Failed),
            "completed" => Ok(RunStatus::Completed),
            other => Err(serde::de::Error::custom(format!("unknown run status: {other}"))),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// Sink every emitted event flows through. `step_*`/`captcha_*`/
/// `completion`/`error` must never be silently dropped - implementations
/// that back this with a bounded channel should await the send rather
/// than try_send-and-discard. Only `screenshot_update` is allowed to
/// coalesce or drop under backpressure, which is why it is modeled
/// separately as a `watch` channel by the Supervisor rather than flowing
/// through this trait at high frequency.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: AgentEvent) -> Result<()>;
}

/// Sink that writes each event as a JSON line to stdout, used by the
/// `replay` CLI subcommand which has no WebSocket client to stream to.
pub struct StdoutSink;

#[async_trait]
impl EventSink for StdoutSink {
    async fn emit(&self, event: AgentEvent) -> Result<()> {
        println!("{}", serde_json::to_string(&event)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_serializes_with_tagged_type() {
        let event = AgentEvent::Completion {
            status: RunStatus::Completed,
            final_answer: Some("done".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "completion");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["finalAnswer"], "done");
    }

    #[test]
    fn screenshot_update_round_trips_through_base64() {
        let event = AgentEvent::ScreenshotUpdate {
            context: RunId::new().into(),
            screenshot: vec![1, 2, 3, 255],
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        match back {
            AgentEvent::ScreenshotUpdate { screenshot, .. } => assert_eq!(screenshot, vec![1, 2, 3, 255]),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn screenshot_update_carries_run_id_not_automation_id() {
        let run_id = RunId::new();
        let event = AgentEvent::ScreenshotUpdate {
            context: run_id.into(),
            screenshot: vec![0],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["runId"], run_id.to_string());
        assert!(json.get("automationId").is_none());
    }
}
