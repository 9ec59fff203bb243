//! Turn primitives — what a wizard hands back to the router, and what the
//! router hands back to the transport.

use std::path::PathBuf;

use crate::engine::state::EngineState;

/// One outbound prompt: text, choice labels laid out in rows, and any
/// file attachments (charts, exports, reports). Transport-agnostic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub choices: Vec<Vec<String>>,
    pub attachments: Vec<PathBuf>,
}

impl TurnReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_choices(mut self, rows: Vec<Vec<String>>) -> Self {
        self.choices = rows;
        self
    }

    /// Single-column layout, one label per row.
    pub fn with_choice_column(mut self, labels: &[&str]) -> Self {
        self.choices = labels.iter().map(|l| vec![l.to_string()]).collect();
        self
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Flattened choice labels, for matching and assertions.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.choices.iter().flatten().map(String::as_str)
    }
}

/// The result of one transition: where the session goes next and what the
/// user sees.
#[derive(Debug, Clone)]
pub struct Step {
    pub next: EngineState,
    pub reply: TurnReply,
}

impl Step {
    pub fn go(next: EngineState, reply: TurnReply) -> Self {
        Self { next, reply }
    }

    /// Remain in `state` — used for validation failures that re-prompt.
    pub fn stay(state: EngineState, reply: TurnReply) -> Self {
        Self {
            next: state,
            reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_flatten_rows() {
        let reply = TurnReply::text("pick one").with_choices(vec![
            vec!["A".into(), "B".into()],
            vec!["Back".into()],
        ]);
        let labels: Vec<_> = reply.labels().collect();
        assert_eq!(labels, ["A", "B", "Back"]);
    }
}
