use serde::{Deserialize, Serialize};

/// One replayable browser action. Field names match the wire/persistence
/// shape exactly so a stored Trace round-trips through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    Navigate { url: String },
    Search { query: String },
    Click { identifier: String },
    Type { placeholder: String, text: String },
    TypeAndEnter { placeholder: String, text: String },
    Scroll,
    Back,
    /// Produced during a live run when the CAPTCHA handler engages. Never
    /// persisted into an Automation's Trace - replay re-derives CAPTCHA
    /// handling from the page itself rather than from a recorded step.
    SolveCaptcha,
}

impl Command {
    /// Whether this variant belongs in a persisted replay Trace. Only
    /// `SolveCaptcha` is excluded - everything else is deterministic.
    pub fn is_traceable(&self) -> bool {
        !matches!(self, Command::SolveCaptcha)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Command::Navigate { .. } => "navigate",
            Command::Search { .. } => "search",
            Command::Click { .. } => "click",
            Command::Type { .. } => "type",
            Command::TypeAndEnter { .. } => "type_and_enter",
            Command::Scroll => "scroll",
            Command::Back => "back",
            Command::SolveCaptcha => "solve_captcha",
        }
    }
}

/// Ordered sequence of Commands suitable for deterministic replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(pub Vec<Command>);

impl Trace {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a command, dropping it silently if it is not traceable
    /// (currently: `SolveCaptcha`). This is the single call site invariant
    /// I3 (trace length <= steps length) relies on.
    pub fn push(&mut self, command: Command) {
        if command.is_traceable() {
            self.0.push(command);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.0.iter()
    }
}

impl IntoIterator for Trace {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_captcha_is_not_traceable() {
        assert!(!Command::SolveCaptcha.is_traceable());
        assert!(Command::Back.is_traceable());
    }

    #[test]
    fn trace_push_drops_captcha_commands() {
        let mut trace = Trace::new();
        trace.push(Command::Navigate {
            url: "https://example.com".into(),
        });
        trace.push(Command::SolveCaptcha);
        trace.push(Command::Back);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.0[0].label(), "navigate");
        assert_eq!(trace.0[1].label(), "back");
    }

    #[test]
    fn command_serializes_with_tagged_type_field() {
        let cmd = Command::Click {
            identifier: "Submit".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "Click");
        assert_eq!(json["identifier"], "Submit");
    }
}
