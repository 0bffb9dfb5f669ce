//! `HttpModelClient` - a `reqwest`-based `ModelClient` against an
//! OpenAI-compatible chat-completions-with-tools endpoint. The hosted
//! model itself is an external collaborator; this is the thin typed
//! wrapper the Decision Loop, CAPTCHA Handler, and Replay Engine call
//! through the shared `ModelClient` seam.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use webpilot_types::{Conversation, Error, ModelClient, ModelTurn, Result, Role, ToolSchema};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDecl<'a>>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ToolDecl<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSchema,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: ToolCallFunction,
}

#[derive(Deserialize)]
struct ToolCallFunction {
    name: String,
    arguments: String,
}

/// Arguments the model is expected to thread through every tool call, on
/// top of the tool's own declared parameters.
#[derive(Deserialize, Default)]
struct CallEnvelope {
    #[serde(default)]
    action: String,
    #[serde(default)]
    explanation: String,
    #[serde(flatten)]
    arguments: Value,
}

pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn next_action(&self, conversation: &Conversation, tools: &[ToolSchema]) -> Result<ModelTurn> {
        let messages = conversation
            .turns
            .iter()
            .map(|t| ChatMessage {
                role: Self::role_str(t.role),
                content: t.content.clone(),
            })
            .collect();
        let tool_decls = tools
            .iter()
            .map(|schema| ToolDecl {
                kind: "function",
                function: schema,
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages,
            tools: tool_decls,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Model(e.to_string()))?
            .json::<ChatResponse>()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        let message = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model("model returned no choices".into()))?
            .message;

        if let Some(call) = message.tool_calls.into_iter().next() {
            let envelope: CallEnvelope = serde_json::from_str(&call.function.arguments)
                .map_err(|e| Error::Model(format!("malformed tool call arguments: {e}")))?;
            return Ok(ModelTurn::ToolCall {
                name: call.function.name,
                arguments: envelope.arguments,
                action: envelope.action,
                explanation: envelope.explanation,
            });
        }

        Ok(ModelTurn::FinalAnswer(message.content.unwrap_or_default()))
    }

    async fn describe_images(&self, images: &[Vec<u8>], prompt: &str) -> Result<String> {
        let mut content = vec![json!({"type": "text", "text": prompt})];
        for image in images {
            let data_url = format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(image)
            );
            content.push(json!({"type": "image_url", "image_url": {"url": data_url}}));
        }
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": content}],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Model(e.to_string()))?
            .json::<ChatResponse>()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_envelope_splits_action_explanation_from_arguments() {
        let raw = r#"{"action":"click submit","explanation":"proceed to checkout","identifier":"Submit"}"#;
        let envelope: CallEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.action, "click submit");
        assert_eq!(envelope.explanation, "proceed to checkout");
        assert_eq!(envelope.arguments["identifier"], "Submit");
    }
}
