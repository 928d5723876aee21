//! Operator-facing message log.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    Text(String),
    Progress { current: usize, target: usize },
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Progress { current, target } => write!(f, "{current}/{target}"),
        }
    }
}

/// Messages of the current calibration run.
///
/// Consecutive progress reports collapse into a single entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn push_text(&mut self, text: impl Into<String>) -> &Message {
        self.push(Message::Text(text.into()))
    }

    pub fn push_progress(&mut self, current: usize, target: usize) -> &Message {
        if let Some(Message::Progress { .. }) = self.entries.last() {
            self.entries.pop();
        }
        self.push(Message::Progress { current, target })
    }

    fn push(&mut self, message: Message) -> &Message {
        self.entries.push(message);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|m| match m {
            Message::Text(text) => Some(text.as_str()),
            Message::Progress { .. } => None,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
