use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{RunId, UserId};
use crate::trace::{Command, Trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Inprogress,
    Failed,
    Completed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Completed)
    }
}

/// One observable decision cycle. Appended only, never mutated, numbered
/// contiguously from 1 within a Run (invariant I1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub number: u32,
    pub action: String,
    pub explanation: String,
}

/// One end-to-end execution of a user objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub user_id: UserId,
    pub objective: String,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    pub trace: Trace,
    pub final_answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(user_id: UserId, objective: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            user_id,
            objective: objective.into(),
            status: RunStatus::Pending,
            steps: Vec::new(),
            trace: Trace::new(),
            final_answer: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition to INPROGRESS. Only valid from PENDING or a resumed,
    /// still-non-terminal run - a disconnected session leaves the Run
    /// resumable rather than FAILED, so callers may call `start` again
    /// after reconnecting.
    pub fn start(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "cannot start a run already in terminal status {:?}",
                self.status
            )));
        }
        self.status = RunStatus::Inprogress;
        Ok(())
    }

    /// Append the next Step, enforcing contiguous 1-based numbering (I1).
    pub fn push_step(&mut self, action: impl Into<String>, explanation: impl Into<String>) -> u32 {
        let number = self.steps.len() as u32 + 1;
        self.steps.push(Step {
            number,
            action: action.into(),
            explanation: explanation.into(),
        });
        number
    }

    /// Append a Command to the Trace (a no-op for non-traceable commands,
    /// e.g. `SolveCaptcha`), preserving invariant I3.
    pub fn push_command(&mut self, command: Command) {
        self.trace.push(command);
    }

    /// Transition to a terminal status exactly once (invariant I2).
    pub fn finish(&mut self, status: RunStatus, final_answer: Option<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidState(
                "run has already reached a terminal status".into(),
            ));
        }
        if !status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "finish() requires a terminal status, got {:?}",
                status
            )));
        }
        self.status = status;
        self.final_answer = final_answer;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> Run {
        Run::new(UserId::new(), "find the stock price")
    }

    #[test]
    fn steps_are_numbered_contiguously_from_one() {
        let mut r = run();
        assert_eq!(r.push_step("a", "x"), 1);
        assert_eq!(r.push_step("b", "y"), 2);
        assert_eq!(r.push_step("c", "z"), 3);
    }

    #[test]
    fn finish_is_rejected_once_terminal() {
        let mut r = run();
        r.start().unwrap();
        r.finish(RunStatus::Completed, Some("done".into())).unwrap();
        assert!(r.finish(RunStatus::Failed, None).is_err());
    }

    #[test]
    fn finish_requires_a_terminal_status() {
        let mut r = run();
        r.start().unwrap();
        assert!(r.finish(RunStatus::Inprogress, None).is_err());
    }

    #[test]
    fn start_rejected_once_terminal() {
        let mut r = run();
        r.start().unwrap();
        r.finish(RunStatus::Failed, None).unwrap();
        assert!(r.start().is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_value(RunStatus::Inprogress).unwrap();
        assert_eq!(json, "INPROGRESS");
    }
}
