//! Replay Engine - deterministically re-executes a saved Automation's
//! Trace: one dispatch per recorded `Command`, screenshot on completion,
//! no retry-on-failure beyond what a tool already does internally, since
//! a recorded Trace is assumed already known-good.

use std::sync::Arc;
use std::time::Duration;

use eoka::Page;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};
use webpilot_agent::captcha;
use webpilot_agent::observe::observe;
use webpilot_agent::tools::{ToolContext, ToolRegistry};
use webpilot_types::{AgentEvent, Automation, Command, EventSink, ModelClient};

use crate::error::Result;

/// Settle time between dispatched commands, giving the page a moment to
/// react before the next step's observation runs.
const STABILITY_GRACE: Duration = Duration::from_millis(1000);

fn command_to_call(command: &Command) -> (&'static str, Value) {
    match command {
        Command::Navigate { url } => ("handle_url", json!({ "url": url })),
        Command::Search { query } => ("handle_search", json!({ "query": query })),
        Command::Click { identifier } => ("handle_click", json!({ "identifier": identifier })),
        Command::Type { placeholder, text } => (
            "handle_typing",
            json!({ "placeholder_value": placeholder, "text": text }),
        ),
        Command::TypeAndEnter { placeholder, text } => (
            "handle_typing_with_enter",
            json!({ "placeholder_value": placeholder, "text": text }),
        ),
        Command::Scroll => ("handle_scroll", json!({})),
        Command::Back => ("handle_back", json!({})),
        Command::SolveCaptcha => ("handle_captcha", json!({})),
    }
}

pub struct ReplayEngine {
    tools: Arc<ToolRegistry>,
    model: Option<Arc<dyn ModelClient>>,
    sink: Arc<dyn EventSink>,
}

impl ReplayEngine {
    /// `model` is optional: without one the completion message falls back
    /// to a neutral string rather than a vision-model summary.
    pub fn new(tools: Arc<ToolRegistry>, model: Option<Arc<dyn ModelClient>>, sink: Arc<dyn EventSink>) -> Self {
        Self { tools, model, sink }
    }

    /// Run every Command in `automation.trace` in order against `page`.
    /// Aborts on the first command failure.
    ///
    /// Like the Decision Loop, `page` is locked only for the span of each
    /// command dispatch and released during the stability-grace sleep, so
    /// the replay screenshot pump can interleave between commands.
    pub async fn run(&self, automation: &Automation, page: &Mutex<Page>) -> Result<String> {
        for (i, command) in automation.trace.iter().enumerate() {
            let number = (i + 1) as u32;
            self.sink.emit(AgentEvent::StepStarted { number }).await?;

            let guard = page.lock().await;
            let elements = observe(&guard, true).await?;
            let ctx = ToolContext { page: &guard, elements: &elements };

            if captcha::detect(&guard).await?.is_some() {
                self.sink.emit(AgentEvent::CaptchaDetected).await?;
                match self.tools.dispatch("handle_captcha", json!({}), &ctx).await {
                    Ok(_) => self.sink.emit(AgentEvent::CaptchaSolved).await?,
                    Err(e) => {
                        warn!(number, %e, "replay aborted: captcha unsolvable");
                        self.sink
                            .emit(AgentEvent::Error { error: e.to_string() })
                            .await?;
                        return Err(e.into());
                    }
                }
            }

            let (name, arguments) = command_to_call(command);
            if let Err(e) = self.tools.dispatch(name, arguments, &ctx).await {
                warn!(number, %e, "replay aborted: command dispatch failed");
                self.sink
                    .emit(AgentEvent::Error { error: e.to_string() })
                    .await?;
                return Err(e.into());
            }
            drop(guard);

            self.sink.emit(AgentEvent::StepCompleted { number }).await?;
            tokio::time::sleep(STABILITY_GRACE).await;
        }

        let message = self.summarize(automation, page).await;
        info!(automation = %automation.name, "replay completed");
        Ok(message)
    }

    async fn summarize(&self, automation: &Automation, page: &Mutex<Page>) -> String {
        let Some(model) = &self.model else {
            return "completed successfully".to_string();
        };
        let Ok(screenshot) = page.lock().await.screenshot().await else {
            return "completed successfully".to_string();
        };
        let prompt = format!(
            "Automation \"{}\" (objective: {}) just finished. Summarize what the final page shows.",
            automation.name, automation.objective
        );
        match model.describe_image(&screenshot, &prompt).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            _ => "completed successfully".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_to_call_maps_navigate_to_handle_url() {
        let (name, args) = command_to_call(&Command::Navigate { url: "https://example.com".into() });
        assert_eq!(name, "handle_url");
        assert_eq!(args["url"], "https://example.com");
    }

    #[test]
    fn command_to_call_maps_type_and_enter() {
        let (name, args) = command_to_call(&Command::TypeAndEnter {
            placeholder: "Search".into(),
            text: "detergent".into(),
        });
        assert_eq!(name, "handle_typing_with_enter");
        assert_eq!(args["placeholder_value"], "Search");
        assert_eq!(args["text"], "detergent");
    }
}
