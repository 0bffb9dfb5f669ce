use serde::{Deserialize, Serialize};

use crate::ids::{AutomationId, UserId};
use crate::trace::Trace;

/// A saved Trace, independent of any Run, replayable any number of times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub user_id: UserId,
    pub name: String,
    pub objective: String,
    pub trace: Trace,
}

impl Automation {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        objective: impl Into<String>,
        trace: Trace,
    ) -> Self {
        Self {
            id: AutomationId::new(),
            user_id,
            name: name.into(),
            objective: objective.into(),
            trace,
        }
    }
}
