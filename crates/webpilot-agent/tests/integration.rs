//! Integration tests for webpilot-agent.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test integration -- --ignored

use eoka::Browser;
use webpilot_agent::annotate::{annotated_screenshot, clear_overlay};
use webpilot_agent::label_numbers;
use webpilot_agent::observe::observe;
use webpilot_agent::tools::{ToolContext, ToolRegistry};
use webpilot_types::ModelClient;

/// Check if Chrome is available.
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

struct NullModel;

#[async_trait::async_trait]
impl ModelClient for NullModel {
    async fn next_action(
        &self,
        _: &webpilot_types::Conversation,
        _: &[webpilot_types::ToolSchema],
    ) -> webpilot_types::Result<webpilot_types::ModelTurn> {
        unreachable!()
    }

    async fn describe_images(&self, _: &[Vec<u8>], _: &str) -> webpilot_types::Result<String> {
        unreachable!()
    }
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn annotated_screenshot_is_idempotent() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("failed to launch browser");
    let page = browser
        .new_page(
            r#"data:text/html,
            <button>Submit</button>
            <input type="checkbox">
        "#,
        )
        .await
        .expect("failed to create page");

    let elements = observe(&page, true).await.expect("failed to observe");
    assert_eq!(elements.len(), 2);

    let first = annotated_screenshot(&page, &elements)
        .await
        .expect("first annotated_screenshot failed");
    assert_eq!(&first[0..4], &[0x89, 0x50, 0x4E, 0x47]);

    // Calling it again should not accumulate a second overlay, and
    // clear_overlay on an already-clean page should be a harmless no-op.
    let second = annotated_screenshot(&page, &elements)
        .await
        .expect("second annotated_screenshot failed");
    assert_eq!(&second[0..4], &[0x89, 0x50, 0x4E, 0x47]);

    clear_overlay(&page).await.expect("clear_overlay failed");

    let leftover: f64 = page
        .evaluate("document.querySelectorAll('.__webpilot_label, .__webpilot_box').length")
        .await
        .expect("failed to evaluate");
    assert_eq!(leftover, 0.0);

    browser.close().await.expect("failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn click_resolves_badge_number_against_qualifying_subset_only() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("failed to launch browser");
    let page = browser
        .new_page(
            r#"data:text/html,
            <button onclick="this.dataset.clicked='submit'">Submit</button>
            <input type="checkbox" onclick="this.dataset.clicked='checkbox'">
            <a href="#" onclick="this.dataset.clicked='link'; return false;">Learn More</a>
            <input type="radio" onclick="this.dataset.clicked='radio'">
        "#,
        )
        .await
        .expect("failed to create page");

    let elements = observe(&page, true).await.expect("failed to observe");
    assert_eq!(elements.len(), 4);

    // Only the checkbox and the radio button lack a natural text
    // identifier, so the qualifying subset skips the button and the link
    // entirely: badge 1 is the checkbox, badge 2 is the radio button, not
    // their raw inventory positions (1 and 3).
    let numbers = label_numbers(&elements);
    let checkbox_index = elements
        .iter()
        .find(|e| e.input_type.as_deref() == Some("checkbox"))
        .expect("checkbox not observed")
        .index;
    let radio_index = elements
        .iter()
        .find(|e| e.input_type.as_deref() == Some("radio"))
        .expect("radio not observed")
        .index;
    assert_eq!(numbers.get(&checkbox_index), Some(&1));
    assert_eq!(numbers.get(&radio_index), Some(&2));

    let tools = ToolRegistry::new(std::sync::Arc::new(NullModel));
    let ctx = ToolContext { page: &page, elements: &elements };
    tools
        .dispatch("handle_click", serde_json::json!({ "identifier": "2" }), &ctx)
        .await
        .expect("dispatch failed");

    let radio_clicked: String = page
        .evaluate("document.querySelector('input[type=radio]').dataset.clicked || ''")
        .await
        .expect("failed to evaluate");
    assert_eq!(radio_clicked, "radio");

    let checkbox_clicked: String = page
        .evaluate("document.querySelector('input[type=checkbox]').dataset.clicked || ''")
        .await
        .expect("failed to evaluate");
    assert_eq!(checkbox_clicked, "", "badge 2 must not resolve to the checkbox");

    browser.close().await.expect("failed to close browser");
}
