// Local crates
use crate::listener::models::Status;

// External crates
use serde::{Deserialize, Serialize};

/// Filtered stream rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl StreamRule {
    /// Rule matching a single keyword, tagged with the keyword itself.
    pub fn for_keyword(keyword: &str) -> Self {
        Self {
            id: None,
            value: keyword.to_owned(),
            tag: Some(keyword.to_owned()),
        }
    }
}

/// Body of `POST /2/tweets/search/stream/rules` adding rules.
#[derive(Debug, Serialize)]
pub struct AddRulesRequest {
    pub add: Vec<StreamRule>,
}

/// Body of `POST /2/tweets/search/stream/rules` deleting rules.
#[derive(Debug, Serialize)]
pub struct DeleteRulesRequest {
    pub delete: DeleteIds,
}

#[derive(Debug, Serialize)]
pub struct DeleteIds {
    pub ids: Vec<String>,
}

/// Response of every rules endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RulesResponse {
    #[serde(default)]
    pub data: Option<Vec<StreamRule>>,
    #[serde(default)]
    pub errors: Option<Vec<serde_json::Value>>,
}

/// Rule that caused a status to be delivered.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingRule {
    #[serde(default)]
    pub tag: Option<String>,
}

/// One line of the filtered stream body.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    pub data: Status,
    #[serde(default)]
    pub matching_rules: Vec<MatchingRule>,
}

/// Classification of a single line read from the stream body.
#[derive(Debug)]
pub enum StreamLine {
    /// Blank keep-alive line.
    KeepAlive,
    /// A status payload.
    Status(Box<StreamEnvelope>),
    /// An error object sent in-band by the API.
    ApiError(String),
    /// Neither of the above.
    Malformed(String),
}

impl StreamLine {
    /// Classify a raw line, already stripped of its trailing newline.
    pub fn decode(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::KeepAlive;
        }

        match serde_json::from_str::<StreamEnvelope>(line) {
            Ok(envelope) => Self::Status(Box::new(envelope)),
            Err(parse_error) => match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) if value.get("errors").is_some() || value.get("title").is_some() => {
                    let msg = value
                        .get("detail")
                        .or_else(|| value.get("title"))
                        .and_then(|v| v.as_str())
                        .or_else(|| {
                            value
                                .get("errors")
                                .and_then(|e| e.get(0))
                                .and_then(|e| e.get("message"))
                                .and_then(|m| m.as_str())
                        })
                        .unwrap_or("Unknown stream error")
                        .to_string();
                    Self::ApiError(msg)
                }
                _ => Self::Malformed(parse_error.to_string()),
            },
        }
    }
}
