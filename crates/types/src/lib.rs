//! Shared type definitions for the graphrun client.
//!
//! The remote service announces the inputs it expects through [`InitData`],
//! streams step results whose last element carries an [`UpdatedState`], and
//! the controller reports progress through [`ExecutionEvent`]s. Everything here
//! is plain data so the engine, the HTTP client, and the CLI can share it.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod execution;

pub use execution::*;

/// Input values submitted to the stream endpoint, keyed by argument name in announcement order.
pub type InputValues = IndexMap<String, Value>;

/// The kind of value an argument expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentType {
    /// Free-form text.
    String,
    /// An image, transported as a string (typically a data URL).
    Image,
    /// Any tag this client does not know about.
    #[serde(other)]
    Other,
}

impl ArgumentType {
    /// Whether values of this type are carried as plain JSON strings.
    pub fn is_textual(self) -> bool {
        matches!(self, ArgumentType::String | ArgumentType::Image)
    }
}

/// Describes one input the remote execution expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: ArgumentType,
}

/// Payload of the `init` endpoint.
///
/// Only `args` is interpreted; any other fields are kept so they can be
/// forwarded untouched with the `init` notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitData {
    #[serde(default)]
    pub args: Vec<ArgumentMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InitData {
    /// Look up an announced argument by name.
    pub fn argument(&self, name: &str) -> Option<&ArgumentMetadata> {
        self.args.iter().find(|argument| argument.name == name)
    }
}

/// Opaque identifier of one execution lineage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn init_data_parses_known_and_unknown_argument_types() {
        let init: InitData = serde_json::from_value(json!({
            "args": [
                { "name": "question", "type": "STRING" },
                { "name": "photo", "type": "IMAGE" },
                { "name": "audio", "type": "AUDIO" }
            ],
            "title": "agent"
        }))
        .expect("init data");

        assert_eq!(init.args.len(), 3);
        assert_eq!(init.args[0].r#type, ArgumentType::String);
        assert_eq!(init.args[1].r#type, ArgumentType::Image);
        assert_eq!(init.args[2].r#type, ArgumentType::Other);
        assert_eq!(init.extra.get("title"), Some(&json!("agent")));
        assert!(init.argument("photo").is_some());
        assert!(init.argument("missing").is_none());
    }

    #[test]
    fn init_data_without_args_defaults_to_empty() {
        let init: InitData = serde_json::from_str("{}").expect("init data");
        assert!(init.args.is_empty());
    }

    #[test]
    fn thread_id_serializes_as_plain_string() {
        let thread = ThreadId::from("t1");
        assert_eq!(serde_json::to_value(&thread).unwrap(), json!("t1"));
        assert_eq!(thread.to_string(), "t1");
    }
}
