//! The Decision Loop - alternates language-model turns with tool
//! dispatch against a live `Page`, recording Steps and a Trace as it
//! goes. A sequence driven to a success condition, but event-driven by a
//! model turn instead of a fixed action list, and bounded by an
//! iteration cap rather than a retry count.

use std::sync::Arc;

use eoka::Page;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};
use webpilot_agent::annotate::annotated_screenshot;
use webpilot_agent::captcha;
use webpilot_agent::observe::observe;
use webpilot_agent::tools::{ToolContext, ToolRegistry};
use webpilot_types::{
    AgentEvent, Conversation, EventSink, ModelClient, ModelTurn, Run, RunStatus, StoreAdapter,
};

use crate::error::{Error, Result};

const MAX_ITERATIONS: u32 = 25;

const SYSTEM_PROMPT: &str = "You are a browser automation agent. You are given an objective \
and a screenshot of the current page with interactive elements outlined and numbered. Call \
exactly one tool per turn to make progress, or reply with plain text to report your final \
answer once the objective is satisfied.";

/// Strip bracketed decorators (e.g. `[thinking] click submit` -> `click submit`)
/// before comparing two turns for the anti-repetition check.
fn strip_brackets(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0u32;
    for ch in text.chars() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

pub struct DecisionLoop {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn EventSink>,
    max_iterations: u32,
}

impl DecisionLoop {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_max_iterations(model, tools, sink, MAX_ITERATIONS)
    }

    /// As `new`, but with the hard iteration cap overridden (e.g. from a
    /// `ServerConfig` loaded at startup rather than the built-in default).
    pub fn with_max_iterations(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        sink: Arc<dyn EventSink>,
        max_iterations: u32,
    ) -> Self {
        Self { model, tools, sink, max_iterations }
    }

    /// Drive `run` to completion against `page`, persisting through `store`
    /// as it goes. Returns once the Run has reached a terminal status.
    ///
    /// `page` is behind a `Mutex` rather than held by a single long-lived
    /// guard: each iteration locks it only for the portion that actually
    /// touches the browser (CAPTCHA check, tool dispatch, post-action
    /// screenshot) and releases it before the next model call, so the
    /// session's screenshot pump can acquire it opportunistically between
    /// iterations instead of blocking for the whole run.
    pub async fn run(&self, run: &mut Run, page: &Mutex<Page>, store: &dyn StoreAdapter) -> Result<()> {
        run.start()?;
        store.update_run_status(run.id, RunStatus::Inprogress, None).await?;

        let mut conversation = Conversation::new(SYSTEM_PROMPT, &run.objective);
        let mut previous_action: Option<String> = None;

        for iteration in 0..self.max_iterations {
            let schemas = self.tools.schemas();
            let turn = self.model.next_action(&conversation, &schemas).await?;

            let (name, arguments, action, explanation) = match turn {
                ModelTurn::FinalAnswer(text) => {
                    conversation.push_assistant(text.clone());
                    return self.finish(run, store, RunStatus::Completed, Some(text)).await;
                }
                ModelTurn::ToolCall { name, arguments, action, explanation } => {
                    (name, arguments, action, explanation)
                }
            };
            conversation.push_assistant(format!("{action}: {explanation}"));

            let stripped = strip_brackets(&action);
            if previous_action.as_deref() == Some(stripped.as_str()) {
                warn!(iteration, "repeated action detected, injecting guidance turn");
                conversation.push_user(
                    "That repeats your previous action verbatim. Try a different approach.",
                );
                continue;
            }
            previous_action = Some(stripped);

            let number = run.push_step(action.clone(), explanation.clone());
            self.sink
                .emit(AgentEvent::StepUpdate {
                    step: run.steps[(number - 1) as usize].clone(),
                })
                .await?;
            store.append_step(run.id, run.steps[(number - 1) as usize].clone()).await?;

            let guard = page.lock().await;
            let elements = observe(&guard, true).await?;
            let ctx = ToolContext { page: &guard, elements: &elements };

            if captcha::detect(&guard).await?.is_some() {
                self.sink.emit(AgentEvent::CaptchaDetected).await?;
                let handler_result = self.tools.dispatch("handle_captcha", json!({}), &ctx).await;
                match handler_result {
                    Ok(_) => self.sink.emit(AgentEvent::CaptchaSolved).await?,
                    Err(e) => {
                        warn!(iteration, %e, "captcha could not be solved, step failed");
                        conversation.push_user(format!("Action failed: {e}"));
                        drop(guard);
                        continue;
                    }
                }
            }

            match self.tools.dispatch(&name, arguments, &ctx).await {
                Ok(command) => {
                    run.push_command(command.clone());
                    if command.is_traceable() {
                        store.append_trace_command(run.id, command).await?;
                    }

                    let elements = observe(&guard, true).await?;
                    let screenshot = annotated_screenshot(&guard, &elements).await?;
                    drop(guard);
                    conversation.push_user(format!(
                        "Step {number} completed. Current page screenshot (annotated PNG, base64): \
                         data:image/png;base64,{}",
                        base64_preview(&screenshot)
                    ));
                }
                Err(e) => {
                    drop(guard);
                    warn!(iteration, %e, "tool dispatch failed, step recorded as failed");
                    conversation.push_user(format!("Action failed: {e}"));
                }
            }
        }

        warn!("max iterations reached");
        self.finish(
            run,
            store,
            RunStatus::Failed,
            Some("max steps".to_string()),
        )
        .await?;
        Err(Error::MaxStepsExceeded(self.max_iterations as usize))
    }

    async fn finish(
        &self,
        run: &mut Run,
        store: &dyn StoreAdapter,
        status: RunStatus,
        final_answer: Option<String>,
    ) -> Result<()> {
        run.finish(status, final_answer.clone())?;
        store.finalize_run(run.id, final_answer.clone(), run.trace.clone()).await?;
        store.update_run_status(run.id, status, run.completed_at).await?;
        info!(?status, "run finished");
        self.sink
            .emit(AgentEvent::Completion { status, final_answer })
            .await?;
        Ok(())
    }
}

fn base64_preview(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_brackets_removes_bracketed_decorators() {
        assert_eq!(strip_brackets("[thinking] click submit"), "click submit");
        assert_eq!(strip_brackets("(note) go back"), "go back");
        assert_eq!(strip_brackets("plain text"), "plain text");
    }
}
