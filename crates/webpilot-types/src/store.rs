use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::automation::Automation;
use crate::error::{Error, Result};
use crate::ids::{AutomationId, RunId, UserId};
use crate::run::{Run, RunStatus, Step};
use crate::trace::{Command, Trace};

/// Persistence capability the Supervisor depends on. Scoped to a single
/// authenticated user - every method implicitly operates within that
/// user's records; an implementor that lets one user's `run_id` reach
/// another user's row is the bug, not a caller's responsibility to guard.
///
/// This is an interface only: the production implementation lives
/// outside this repository. `InMemoryStore` below is enough to exercise
/// every call site in tests and in the `replay` CLI subcommand.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn fetch_run(&self, run_id: RunId) -> Result<Run>;
    async fn fetch_automation(&self, automation_id: AutomationId) -> Result<Automation>;
    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn append_step(&self, run_id: RunId, step: Step) -> Result<()>;
    async fn append_trace_command(&self, run_id: RunId, command: Command) -> Result<()>;
    async fn finalize_run(
        &self,
        run_id: RunId,
        final_answer: Option<String>,
        trace: Trace,
    ) -> Result<()>;
}

/// Reference `StoreAdapter` backed by an in-process map. Scoped to a single
/// user at construction time, matching how the Supervisor hands out a
/// fresh store handle per authenticated session.
pub struct InMemoryStore {
    user_id: UserId,
    runs: RwLock<HashMap<RunId, Run>>,
    automations: RwLock<HashMap<AutomationId, Automation>>,
}

impl InMemoryStore {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            runs: RwLock::new(HashMap::new()),
            automations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert_run(&self, run: Run) {
        self.runs.write().await.insert(run.id, run);
    }

    pub async fn insert_automation(&self, automation: Automation) {
        self.automations
            .write()
            .await
            .insert(automation.id, automation);
    }

    fn check_owner(&self, owner: UserId) -> Result<()> {
        if owner != self.user_id {
            return Err(Error::Unauthenticated(
                "record does not belong to this session's user".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for InMemoryStore {
    async fn fetch_run(&self, run_id: RunId) -> Result<Run> {
        let run = self
            .runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        self.check_owner(run.user_id)?;
        Ok(run)
    }

    async fn fetch_automation(&self, automation_id: AutomationId) -> Result<Automation> {
        let automation = self
            .automations
            .read()
            .await
            .get(&automation_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("automation {automation_id}")))?;
        self.check_owner(automation.user_id)?;
        Ok(automation)
    }

    async fn update_run_status(
        &self,
        run_id: RunId,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        self.check_owner(run.user_id)?;
        run.status = status;
        run.completed_at = finished_at;
        Ok(())
    }

    async fn append_step(&self, run_id: RunId, step: Step) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        self.check_owner(run.user_id)?;
        run.steps.push(step);
        Ok(())
    }

    async fn append_trace_command(&self, run_id: RunId, command: Command) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        self.check_owner(run.user_id)?;
        run.trace.push(command);
        Ok(())
    }

    async fn finalize_run(
        &self,
        run_id: RunId,
        final_answer: Option<String>,
        trace: Trace,
    ) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        self.check_owner(run.user_id)?;
        run.final_answer = final_answer;
        run.trace = trace;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_run_rejects_cross_user_access() {
        let owner = UserId::new();
        let store = InMemoryStore::new(owner);
        let run = Run::new(UserId::new(), "objective owned by someone else");
        let run_id = run.id;
        // bypass the owner check to seed a foreign run directly
        store.runs.write().await.insert(run_id, run);

        let err = store.fetch_run(run_id).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn append_step_accumulates_in_order() {
        let owner = UserId::new();
        let store = InMemoryStore::new(owner);
        let run = Run::new(owner, "objective");
        let run_id = run.id;
        store.insert_run(run).await;

        store
            .append_step(
                run_id,
                Step {
                    number: 1,
                    action: "navigate".into(),
                    explanation: "go to example.com".into(),
                },
            )
            .await
            .unwrap();

        let fetched = store.fetch_run(run_id).await.unwrap();
        assert_eq!(fetched.steps.len(), 1);
        assert_eq!(fetched.steps[0].number, 1);
    }
}
