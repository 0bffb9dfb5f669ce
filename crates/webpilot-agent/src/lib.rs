//! Browser capability layer: the element inventory and diff types the
//! observe/annotate/tool modules share, plus the Page Annotator, Tool
//! Set, and CAPTCHA Handler built directly on a live `eoka::Page`.

pub mod annotate;
pub mod captcha;
pub mod error;
pub mod observe;
pub mod target;
pub mod tools;

pub use error::{Error, Result};

use std::fmt;

use eoka::BoundingBox;

/// An interactive element on the page, identified by index.
#[derive(Debug, Clone)]
pub struct InteractiveElement {
    /// Zero-based index (stable until next `observe()`)
    pub index: usize,
    /// HTML tag name (e.g. "button", "input", "a")
    pub tag: String,
    /// ARIA role if set
    pub role: Option<String>,
    /// Visible text content, truncated to 60 chars
    pub text: String,
    /// Placeholder attribute for inputs
    pub placeholder: Option<String>,
    /// Input type (only for `<input>` and `<select>` elements)
    pub input_type: Option<String>,
    /// Unique CSS selector for this element
    pub selector: String,
    /// Whether the element is checked (radio/checkbox)
    pub checked: bool,
    /// Current value of form element (None if empty or non-form)
    pub value: Option<String>,
    /// Bounding box in viewport coordinates
    pub bbox: BoundingBox,
    /// Fingerprint for stale element detection (hash of tag+text+attributes)
    pub fingerprint: u64,
}

impl InteractiveElement {
    /// Create a fingerprint from element properties for stale detection.
    /// Includes enough fields to distinguish similar elements.
    pub fn compute_fingerprint(
        tag: &str,
        text: &str,
        role: Option<&str>,
        input_type: Option<&str>,
        placeholder: Option<&str>,
        selector: &str,
    ) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        tag.hash(&mut hasher);
        text.hash(&mut hasher);
        role.hash(&mut hasher);
        input_type.hash(&mut hasher);
        placeholder.hash(&mut hasher);
        // Include selector prefix (first 50 chars) for positional uniqueness
        selector[..selector.len().min(50)].hash(&mut hasher);
        hasher.finish()
    }
}

/// Whether an element has no natural text/placeholder identifier of its
/// own and therefore needs a numbered badge when annotated.
pub fn needs_label(el: &InteractiveElement) -> bool {
    el.text.is_empty() && el.placeholder.is_none()
}

/// Badge numbers for the qualifying (label-needing) elements only, in
/// inventory order, starting at 1 - keyed by `InteractiveElement::index`
/// so a badge number seen on an annotated screenshot can be resolved back
/// to the element it marks. Elements that don't need a label (they
/// already show their own text) have no entry.
pub fn label_numbers(elements: &[InteractiveElement]) -> std::collections::HashMap<usize, usize> {
    elements
        .iter()
        .filter(|el| needs_label(el))
        .enumerate()
        .map(|(n, el)| (el.index, n + 1))
        .collect()
}

impl fmt::Display for InteractiveElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}", self.index, self.tag)?;
        if let Some(ref t) = self.input_type {
            if t != "text" {
                write!(f, " type=\"{}\"", t)?;
            }
        }
        f.write_str(">")?;
        if self.checked {
            f.write_str(" [checked]")?;
        }
        if !self.text.is_empty() {
            write!(f, " \"{}\"", self.text)?;
        }
        if let Some(ref v) = self.value {
            write!(f, " value=\"{}\"", v)?;
        }
        if let Some(ref p) = self.placeholder {
            write!(f, " placeholder=\"{}\"", p)?;
        }
        if let Some(ref r) = self.role {
            let redundant = (r == "button" && self.tag == "button")
                || (r == "link" && self.tag == "a")
                || (r == "menuitem" && self.tag == "a");
            if !redundant {
                write!(f, " role=\"{}\"", r)?;
            }
        }
        Ok(())
    }
}

/// Configuration for observation behavior.
#[derive(Debug, Clone)]
pub struct ObserveConfig {
    /// Only include elements visible in the current viewport.
    /// Dramatically reduces token count on long pages. Default: true.
    pub viewport_only: bool,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            viewport_only: true,
        }
    }
}

/// Result of a diff-based observation.
#[derive(Debug)]
pub struct ObserveDiff {
    /// Indices of elements that appeared since last observe.
    pub added: Vec<usize>,
    /// Count of elements that disappeared since last observe.
    pub removed: usize,
    /// Total element count after this observe.
    pub total: usize,
}

impl fmt::Display for ObserveDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.added.is_empty() && self.removed == 0 {
            write!(f, "no changes ({} elements)", self.total)
        } else {
            let mut need_sep = false;
            if !self.added.is_empty() {
                write!(f, "+{} added", self.added.len())?;
                need_sep = true;
            }
            if self.removed > 0 {
                if need_sep {
                    write!(f, ", ")?;
                }
                write!(f, "-{} removed", self.removed)?;
            }
            write!(f, " ({} total)", self.total)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn make_element(
        index: usize,
        tag: &str,
        text: &str,
        role: Option<&str>,
        input_type: Option<&str>,
        placeholder: Option<&str>,
        value: Option<&str>,
        checked: bool,
    ) -> InteractiveElement {
        let selector = format!("[data-idx=\"{}\"]", index);
        let fingerprint = InteractiveElement::compute_fingerprint(
            tag,
            text,
            role,
            input_type,
            placeholder,
            &selector,
        );
        InteractiveElement {
            index,
            tag: tag.to_string(),
            text: text.to_string(),
            role: role.map(|s| s.to_string()),
            input_type: input_type.map(|s| s.to_string()),
            placeholder: placeholder.map(|s| s.to_string()),
            value: value.map(|s| s.to_string()),
            checked,
            selector,
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 30.0,
            },
            fingerprint,
        }
    }

    #[test]
    fn test_element_display_basic() {
        let el = make_element(0, "button", "Submit", None, None, None, None, false);
        assert_eq!(el.to_string(), "[0] <button> \"Submit\"");
    }

    #[test]
    fn test_element_display_with_input_type() {
        // text type is suppressed
        let el = make_element(0, "input", "", None, Some("text"), None, None, false);
        assert_eq!(el.to_string(), "[0] <input>");

        // other types are shown
        let el = make_element(0, "input", "", None, Some("password"), None, None, false);
        assert_eq!(el.to_string(), "[0] <input type=\"password\">");
    }

    #[test]
    fn test_element_display_with_placeholder() {
        let el = make_element(
            0,
            "input",
            "",
            None,
            Some("text"),
            Some("Enter email"),
            None,
            false,
        );
        assert_eq!(el.to_string(), "[0] <input> placeholder=\"Enter email\"");
    }

    #[test]
    fn test_element_display_with_value() {
        let el = make_element(
            0,
            "input",
            "",
            None,
            Some("text"),
            None,
            Some("hello"),
            false,
        );
        assert_eq!(el.to_string(), "[0] <input> value=\"hello\"");
    }

    #[test]
    fn test_element_display_checked() {
        let el = make_element(0, "input", "", None, Some("checkbox"), None, None, true);
        assert_eq!(el.to_string(), "[0] <input type=\"checkbox\"> [checked]");
    }

    #[test]
    fn test_element_display_redundant_role_suppressed() {
        // button role on button tag is redundant
        let el = make_element(
            0,
            "button",
            "Click",
            Some("button"),
            None,
            None,
            None,
            false,
        );
        assert_eq!(el.to_string(), "[0] <button> \"Click\"");

        // link role on a tag is redundant
        let el = make_element(0, "a", "Link", Some("link"), None, None, None, false);
        assert_eq!(el.to_string(), "[0] <a> \"Link\"");

        // menuitem role on a tag is redundant
        let el = make_element(0, "a", "Menu", Some("menuitem"), None, None, None, false);
        assert_eq!(el.to_string(), "[0] <a> \"Menu\"");
    }

    #[test]
    fn test_element_display_non_redundant_role_shown() {
        // tab role on button is meaningful
        let el = make_element(0, "button", "Tab 1", Some("tab"), None, None, None, false);
        assert_eq!(el.to_string(), "[0] <button> \"Tab 1\" role=\"tab\"");

        // button role on div is meaningful
        let el = make_element(0, "div", "Click", Some("button"), None, None, None, false);
        assert_eq!(el.to_string(), "[0] <div> \"Click\" role=\"button\"");
    }

    #[test]
    fn test_observe_diff_display_no_changes() {
        let diff = ObserveDiff {
            added: vec![],
            removed: 0,
            total: 5,
        };
        assert_eq!(diff.to_string(), "no changes (5 elements)");
    }

    #[test]
    fn test_observe_diff_display_added_only() {
        let diff = ObserveDiff {
            added: vec![5, 6],
            removed: 0,
            total: 7,
        };
        assert_eq!(diff.to_string(), "+2 added (7 total)");
    }

    #[test]
    fn test_observe_diff_display_removed_only() {
        let diff = ObserveDiff {
            added: vec![],
            removed: 3,
            total: 2,
        };
        assert_eq!(diff.to_string(), "-3 removed (2 total)");
    }

    #[test]
    fn test_observe_diff_display_both() {
        let diff = ObserveDiff {
            added: vec![3, 4],
            removed: 1,
            total: 5,
        };
        assert_eq!(diff.to_string(), "+2 added, -1 removed (5 total)");
    }

    #[test]
    fn test_observe_config_default() {
        let config = ObserveConfig::default();
        assert!(config.viewport_only);
    }

    #[test]
    fn label_numbers_are_sequential_over_qualifying_elements_only() {
        let elements = vec![
            make_element(0, "button", "Submit", None, None, None, None, false),
            make_element(1, "div", "", None, None, None, None, false),
            make_element(2, "a", "Home", None, None, None, None, false),
            make_element(3, "input", "", None, Some("text"), None, None, false),
        ];
        let numbers = label_numbers(&elements);
        assert_eq!(numbers.get(&0), None);
        assert_eq!(numbers.get(&1), Some(&1));
        assert_eq!(numbers.get(&2), None);
        assert_eq!(numbers.get(&3), Some(&2));
    }

    #[test]
    fn needs_label_is_false_when_placeholder_present() {
        let el = make_element(0, "input", "", None, Some("text"), Some("Email"), None, false);
        assert!(!needs_label(&el));
    }
}
