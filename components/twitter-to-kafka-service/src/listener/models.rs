// Local crates
use crate::helpers::errors::ListenerError;

// External crates
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single status delivered by the streaming client.
///
/// Only `text` is read by the listener. The remaining fields are carried so
/// that a forwarding step can key and timestamp the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Status {
    /// Build a status carrying only an id and a text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Display text of the status, verbatim. Empty text is still text.
    pub fn text(&self) -> Result<&str, ListenerError> {
        self.text.as_deref().ok_or_else(|| ListenerError::MissingText {
            id: self.id.clone().unwrap_or_else(|| "unknown".into()),
        })
    }
}
