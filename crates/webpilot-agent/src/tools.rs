//! Tool Set — the only bridge between a language model and the Browser
//! Capability. Each `Tool` validates its own arguments, performs the
//! corresponding page action, and returns the `Command` that records what
//! it did (consumed by the caller to append to a Run's Trace).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eoka::Page;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use webpilot_types::{Command, ModelClient, ToolSchema};

use crate::captcha::CaptchaHandler;
use crate::error::{Error, Result};
use crate::target::{self, LivePattern};
use crate::{label_numbers, InteractiveElement};

/// Everything a Tool needs to act: the live page, plus the most recent
/// element inventory for identifier resolution (the two-stage click
/// resolution starts here before falling back to a live DOM query).
pub struct ToolContext<'a> {
    pub page: &'a Page,
    pub elements: &'a [InteractiveElement],
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command>;
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| Error::InvalidArguments(e.to_string()))
}

fn tool_schema<T: JsonSchema>(name: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null),
    }
}

// ---------------------------------------------------------------------------
// handle_url
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct NavigateArgs {
    /// Absolute URL to navigate to.
    url: String,
}

pub struct NavigateTool;

#[async_trait]
impl Tool for NavigateTool {
    fn name(&self) -> &'static str {
        "handle_url"
    }

    fn schema(&self) -> ToolSchema {
        tool_schema::<NavigateArgs>(self.name(), "Navigate the browser to an absolute URL.")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let args: NavigateArgs = parse_args(args)?;
        if !(args.url.starts_with("http://") || args.url.starts_with("https://")) {
            return Err(Error::InvalidArguments(format!(
                "url must be absolute, got \"{}\"",
                args.url
            )));
        }
        ctx.page.goto(&args.url).await?;
        let _ = ctx.page.wait_for_network_idle(200, 2000).await;
        Ok(Command::Navigate { url: args.url })
    }
}

// ---------------------------------------------------------------------------
// handle_search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchArgs {
    /// Text to type into the page's search input, followed by Enter.
    query: String,
}

const SEARCH_INPUT_JS: &str = r#"
(() => {
    const candidates = [
        'input[type="search"]',
        'input[name="q"]',
        'input[aria-label*="search" i]',
        'input[placeholder*="search" i]',
        'input#twotabsearchtextbox',
        'input[type="text"]',
    ];
    for (const sel of candidates) {
        const el = document.querySelector(sel);
        if (el) {
            const r = el.getBoundingClientRect();
            if (r.width > 0 && r.height > 0) return el.id ? '#' + CSS.escape(el.id) : sel;
        }
    }
    return null;
})()
"#;

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "handle_search"
    }

    fn schema(&self) -> ToolSchema {
        tool_schema::<SearchArgs>(
            self.name(),
            "Type a query into the current page's visible search input and press Enter.",
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let args: SearchArgs = parse_args(args)?;
        let selector: Option<String> = ctx.page.evaluate(SEARCH_INPUT_JS).await?;
        let selector = selector.ok_or_else(|| {
            Error::InvalidArguments("no visible search input found on the page".into())
        })?;
        ctx.page.fill(&selector, &args.query).await?;
        ctx.page.human().press_key("Enter").await?;
        Ok(Command::Search { query: args.query })
    }
}

// ---------------------------------------------------------------------------
// handle_click
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct ClickArgs {
    /// Either the numeric label shown in the annotated screenshot, or the
    /// visible text of the element to click.
    identifier: String,
}

pub struct ClickTool;

impl ClickTool {
    /// Two-stage resolution: exact then substring match across {text,
    /// value, aria-label, title, placeholder} in the cached inventory,
    /// then a live DOM query, then (if purely numeric) the badge number
    /// rendered on the annotated screenshot - which counts only the
    /// elements that needed one, not their position in the full
    /// inventory, so it must be resolved through the same numbering the
    /// annotator used rather than `elements[identifier]`.
    async fn resolve_selector(identifier: &str, ctx: &ToolContext<'_>) -> Result<String> {
        let needle = identifier.to_lowercase();

        if let Some(el) = ctx.elements.iter().find(|e| element_text_matches(e, &needle, true)) {
            return Ok(el.selector.clone());
        }
        if let Some(el) = ctx.elements.iter().find(|e| element_text_matches(e, &needle, false)) {
            return Ok(el.selector.clone());
        }

        let pattern = LivePattern::parse(identifier);
        if let Ok(resolved) = target::resolve(ctx.page, &pattern).await {
            if resolved.found {
                return Ok(resolved.selector);
            }
        }

        if let Ok(badge) = identifier.trim().parse::<usize>() {
            let numbers = label_numbers(ctx.elements);
            if let Some(el) = ctx
                .elements
                .iter()
                .find(|e| numbers.get(&e.index) == Some(&badge))
            {
                return Ok(el.selector.clone());
            }
        }

        Err(Error::InvalidArguments(format!(
            "could not resolve click target \"{identifier}\""
        )))
    }
}

fn element_text_matches(el: &InteractiveElement, needle: &str, exact: bool) -> bool {
    let fields = [
        Some(el.text.as_str()),
        el.value.as_deref(),
        el.placeholder.as_deref(),
    ];
    fields.into_iter().flatten().any(|f| {
        let f = f.to_lowercase();
        if exact {
            f == needle
        } else {
            f.contains(needle)
        }
    })
}

#[async_trait]
impl Tool for ClickTool {
    fn name(&self) -> &'static str {
        "handle_click"
    }

    fn schema(&self) -> ToolSchema {
        tool_schema::<ClickArgs>(self.name(), "Click an element by its label index or visible text.")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let args: ClickArgs = parse_args(args)?;
        let selector = Self::resolve_selector(&args.identifier, ctx).await?;
        ctx.page.click(&selector).await?;
        let _ = ctx.page.wait_for_network_idle(200, 2000).await;
        Ok(Command::Click {
            identifier: args.identifier,
        })
    }
}

// ---------------------------------------------------------------------------
// handle_typing / handle_typing_with_enter
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct TypeArgs {
    /// Placeholder, label, aria-label, name, or id substring identifying
    /// the field (case-insensitive).
    placeholder_value: String,
    /// Text to type after clearing the field.
    text: String,
}

const FIELD_MATCH_JS: &str = r#"
(needle) => {
    const lc = (s) => (s || '').toLowerCase();
    const n = lc(needle);
    const els = [...document.querySelectorAll('input,textarea,select')];
    const byLabel = (el) => {
        if (el.id) {
            const label = document.querySelector(`label[for="${CSS.escape(el.id)}"]`);
            if (label) return label.textContent;
        }
        return el.closest('label')?.textContent || '';
    };
    const match = els.find(el =>
        lc(el.placeholder).includes(n) ||
        lc(el.getAttribute('aria-label')).includes(n) ||
        lc(el.name).includes(n) ||
        lc(el.id).includes(n) ||
        lc(byLabel(el)).includes(n)
    );
    if (!match) return null;
    return match.id ? '#' + CSS.escape(match.id) : null;
}
"#;

async fn resolve_field_selector(page: &Page, needle: &str) -> Result<String> {
    let js = format!("({FIELD_MATCH_JS})({})", serde_json::to_string(needle).unwrap());
    let selector: Option<String> = page.evaluate(&js).await?;
    selector.ok_or_else(|| {
        Error::InvalidArguments(format!("no input field matching \"{needle}\" found"))
    })
}

async fn fill_with_retry(page: &Page, selector: &str, text: &str) -> Result<()> {
    let mut last_err = None;
    for attempt in 0..3 {
        match page.fill(selector, text).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(attempt, %e, "fill failed, retrying");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    Err(last_err.unwrap().into())
}

pub struct TypeTool;

#[async_trait]
impl Tool for TypeTool {
    fn name(&self) -> &'static str {
        "handle_typing"
    }

    fn schema(&self) -> ToolSchema {
        tool_schema::<TypeArgs>(self.name(), "Clear a field and type text into it.")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let args: TypeArgs = parse_args(args)?;
        let selector = resolve_field_selector(ctx.page, &args.placeholder_value).await?;
        fill_with_retry(ctx.page, &selector, &args.text).await?;
        Ok(Command::Type {
            placeholder: args.placeholder_value,
            text: args.text,
        })
    }
}

pub struct TypeAndEnterTool;

#[async_trait]
impl Tool for TypeAndEnterTool {
    fn name(&self) -> &'static str {
        "handle_typing_with_enter"
    }

    fn schema(&self) -> ToolSchema {
        tool_schema::<TypeArgs>(self.name(), "Clear a field, type text into it, then press Enter.")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let args: TypeArgs = parse_args(args)?;
        let selector = resolve_field_selector(ctx.page, &args.placeholder_value).await?;
        fill_with_retry(ctx.page, &selector, &args.text).await?;
        ctx.page.human().press_key("Enter").await?;
        Ok(Command::TypeAndEnter {
            placeholder: args.placeholder_value,
            text: args.text,
        })
    }
}

// ---------------------------------------------------------------------------
// handle_scroll
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct ScrollArgs {
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

pub struct ScrollTool;

#[async_trait]
impl Tool for ScrollTool {
    fn name(&self) -> &'static str {
        "handle_scroll"
    }

    fn schema(&self) -> ToolSchema {
        tool_schema::<ScrollArgs>(
            self.name(),
            "Scroll the page. Default direction is down, default amount is one viewport height.",
        )
    }

    async fn execute(&self, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let args: ScrollArgs = parse_args(args)?;
        let down = args.direction.as_deref() != Some("up");
        let js = match args.amount {
            Some(amount) if down => format!("window.scrollBy(0, {amount})"),
            Some(amount) => format!("window.scrollBy(0, -{amount})"),
            None if down => "window.scrollBy(0, window.innerHeight * 0.8)".to_string(),
            None => "window.scrollBy(0, -window.innerHeight * 0.8)".to_string(),
        };
        ctx.page.execute(&js).await?;
        Ok(Command::Scroll)
    }
}

// ---------------------------------------------------------------------------
// handle_back
// ---------------------------------------------------------------------------

pub struct BackTool;

#[async_trait]
impl Tool for BackTool {
    fn name(&self) -> &'static str {
        "handle_back"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Go back in browser history.".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        ctx.page.back().await?;
        let _ = ctx.page.wait_for_network_idle(200, 2000).await;
        Ok(Command::Back)
    }
}

// ---------------------------------------------------------------------------
// handle_captcha
// ---------------------------------------------------------------------------

pub struct CaptchaTool {
    handler: CaptchaHandler,
}

impl CaptchaTool {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            handler: CaptchaHandler::new(model),
        }
    }
}

#[async_trait]
impl Tool for CaptchaTool {
    fn name(&self) -> &'static str {
        "handle_captcha"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: "Detect and attempt to solve any CAPTCHA currently blocking the page."
                .to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        self.handler.handle(ctx.page).await?;
        Ok(Command::SolveCaptcha)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps a model-proposed tool name to its typed handler - the one place
/// that resolves dynamic tool dispatch into a concrete call, rather than
/// a fixed match over tool names at every call site.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            tools: vec![
                Box::new(NavigateTool),
                Box::new(SearchTool),
                Box::new(ClickTool),
                Box::new(TypeTool),
                Box::new(TypeAndEnterTool),
                Box::new(ScrollTool),
                Box::new(BackTool),
                Box::new(CaptchaTool::new(model)),
            ],
        }
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub async fn dispatch(&self, name: &str, args: Value, ctx: &ToolContext<'_>) -> Result<Command> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::InvalidArguments(format!("unknown tool \"{name}\"")))?;
        tool.execute(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eoka::BoundingBox;

    fn element(text: &str, value: Option<&str>) -> InteractiveElement {
        InteractiveElement {
            index: 0,
            tag: "button".into(),
            role: None,
            text: text.into(),
            placeholder: None,
            input_type: None,
            selector: "#x".into(),
            checked: false,
            value: value.map(|s| s.into()),
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            fingerprint: 0,
        }
    }

    #[test]
    fn element_text_matches_is_case_insensitive() {
        let el = element("Submit Form", None);
        assert!(element_text_matches(&el, "submit form", true));
        assert!(element_text_matches(&el, "submit", false));
        assert!(!element_text_matches(&el, "submit", true));
    }

    #[test]
    fn registry_resolves_tool_by_name() {
        struct NullModel;
        #[async_trait::async_trait]
        impl ModelClient for NullModel {
            async fn next_action(
                &self,
                _: &webpilot_types::Conversation,
                _: &[ToolSchema],
            ) -> webpilot_types::Result<webpilot_types::ModelTurn> {
                unreachable!()
            }
            async fn describe_images(&self, _: &[Vec<u8>], _: &str) -> webpilot_types::Result<String> {
                unreachable!()
            }
        }

        let registry = ToolRegistry::new(Arc::new(NullModel));
        assert!(registry.get("handle_url").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.schemas().len(), 8);
    }
}
