//! Page annotator — injects highlight outlines and, for elements with no
//! natural textual identifier, a numbered label above them.

use eoka::{Page, Result};

use crate::{label_numbers, needs_label, InteractiveElement};

const OVERLAY_ID: &str = "__webpilot_overlay";

/// Remove any overlay left by a previous `annotated_screenshot` call.
/// Safe to call when no overlay is present. Makes `annotated_screenshot`
/// idempotent: a second call always starts from a clean DOM.
pub async fn clear_overlay(page: &Page) -> Result<()> {
    page.execute(&format!(
        "document.getElementById('{OVERLAY_ID}')?.remove()"
    ))
    .await
}

/// Inject highlight outlines plus numbered labels (only on elements that
/// have no natural text/placeholder of their own), take a screenshot, then
/// remove the overlay.
pub async fn annotated_screenshot(page: &Page, elements: &[InteractiveElement]) -> Result<Vec<u8>> {
    clear_overlay(page).await?;

    if elements.is_empty() {
        return page.screenshot().await;
    }

    // Badge numbers count only the elements that need one, so the numbers
    // rendered on screen run 1, 2, 3... with no gaps for elements already
    // identified by their own text.
    let numbers = label_numbers(elements);

    // Build element data as JSON — avoids all escaping issues
    let elem_data: Vec<serde_json::Value> = elements
        .iter()
        .map(|el| {
            let label = needs_label(el);
            let badge = numbers.get(&el.index).copied().unwrap_or(0);
            serde_json::json!({
                "i": badge,
                "x": el.bbox.x as i32,
                "y": el.bbox.y as i32,
                "w": el.bbox.width as i32,
                "h": el.bbox.height as i32,
                "label": label,
            })
        })
        .collect();

    let inject_js = format!(
        r#"
(() => {{
    const data = {json};
    const container = document.createElement('div');
    container.id = '{overlay_id}';

    const style = document.createElement('style');
    style.textContent = `
        .__webpilot_label {{
            position: fixed;
            z-index: 2147483647;
            background: rgba(234, 179, 8, 0.95);
            color: black;
            font: bold 10px/12px monospace;
            padding: 1px 3px;
            border-radius: 2px;
            pointer-events: none;
            white-space: nowrap;
        }}
        .__webpilot_box {{
            position: fixed;
            z-index: 2147483646;
            border: 1.5px solid rgba(220, 38, 38, 0.7);
            pointer-events: none;
            border-radius: 1px;
        }}
    `;
    container.appendChild(style);

    // Track label positions to avoid overlaps
    const placed = [];

    for (const el of data) {{
        // Border on every qualifying element
        const box = document.createElement('div');
        box.className = '__webpilot_box';
        box.style.cssText = 'left:' + el.x + 'px;top:' + el.y + 'px;width:' + el.w + 'px;height:' + el.h + 'px';
        container.appendChild(box);

        if (!el.label) continue;

        // Numbered label only for elements with no natural text identifier,
        // nominally 25px above the element — try top-left, top-right,
        // bottom-left, inside top-left if the viewport edge crowds it out.
        const labelW = String(el.i).length * 7 + 8;
        const labelH = 14;
        const above = 25;
        const vw = window.innerWidth, vh = window.innerHeight;
        const clampX = v => Math.max(0, Math.min(v, vw - labelW));
        const clampY = v => Math.max(0, Math.min(v, vh - labelH));
        const candidates = [
            [clampX(el.x), clampY(el.y - above)],
            [clampX(el.x + el.w - labelW), clampY(el.y - above)],
            [clampX(el.x), clampY(el.y + el.h + 1)],
            [clampX(el.x + 2), clampY(el.y + 2)],
        ];

        let bestX = candidates[0][0], bestY = candidates[0][1];
        for (const [cx, cy] of candidates) {{
            let overlaps = false;
            for (const p of placed) {{
                if (cx < p[0] + p[2] && cx + labelW > p[0] && cy < p[1] + p[3] && cy + labelH > p[1]) {{
                    overlaps = true;
                    break;
                }}
            }}
            if (!overlaps) {{
                bestX = cx;
                bestY = cy;
                break;
            }}
        }}

        placed.push([bestX, bestY, labelW, labelH]);

        const label = document.createElement('div');
        label.className = '__webpilot_label';
        label.style.cssText = 'left:' + bestX + 'px;top:' + bestY + 'px;text-shadow:0 0 2px rgba(0,0,0,0.8)';
        label.textContent = String(el.i);
        container.appendChild(label);
    }}

    document.body.appendChild(container);
}})()
"#,
        json = serde_json::to_string(&elem_data).unwrap_or_default(),
        overlay_id = OVERLAY_ID,
    );

    page.execute(&inject_js).await?;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let png = page.screenshot().await?;
    clear_overlay(page).await?;

    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_id_is_stable() {
        assert_eq!(OVERLAY_ID, "__webpilot_overlay");
    }
}
