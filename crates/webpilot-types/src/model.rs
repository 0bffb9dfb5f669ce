use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Append-only conversation fed to the language model each iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            turns: vec![
                Turn {
                    role: Role::System,
                    content: system_prompt.into(),
                },
                Turn {
                    role: Role::User,
                    content: objective.into(),
                },
            ],
        }
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
    }
}

/// The declared shape of a callable Tool, as presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// What the model decided to do this turn.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    ToolCall {
        name: String,
        arguments: serde_json::Value,
        action: String,
        explanation: String,
    },
    FinalAnswer(String),
}

/// Vision-language-model capability. The hosted model itself is an
/// external collaborator; this trait is the seam the Decision Loop, the
/// CAPTCHA Handler, and the Replay Engine's summary step all call through.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Decide the next tool call (or final answer) given the conversation
    /// so far and the tools available to call.
    async fn next_action(
        &self,
        conversation: &Conversation,
        tools: &[ToolSchema],
    ) -> Result<ModelTurn>;

    /// Describe a single image given a free-form prompt. Used for CAPTCHA
    /// text extraction and post-replay summaries.
    async fn describe_image(&self, image: &[u8], prompt: &str) -> Result<String> {
        self.describe_images(std::slice::from_ref(&image.to_vec()), prompt).await
    }

    /// Describe a set of images together against one free-form prompt.
    /// Used for CAPTCHA tile selection, where each tile must reach the
    /// model as its own real image rather than concatenated into one blob.
    async fn describe_images(&self, images: &[Vec<u8>], prompt: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_seeds_system_then_objective() {
        let convo = Conversation::new("you are an agent", "find the price");
        assert_eq!(convo.turns.len(), 2);
        assert_eq!(convo.turns[0].role, Role::System);
        assert_eq!(convo.turns[1].role, Role::User);
    }

    #[test]
    fn last_assistant_text_skips_trailing_user_turns() {
        let mut convo = Conversation::new("sys", "obj");
        convo.push_assistant("first reply");
        convo.push_user("guidance");
        assert_eq!(convo.last_assistant_text(), Some("first reply"));
    }
}
