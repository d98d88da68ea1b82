use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::de::NodeDeserializer;
use crate::node::Node;

/// A deserialization failure pinned to the field that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path as reported by serde_path_to_error (`"."` for the root).
    pub path: String,
    /// Top-level field the error belongs to, when one can be named.
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {} → {}", self.path, self.message)
    }
}

impl std::error::Error for FieldError {}

/// Deserialize a tree with field-path context in error messages.
pub fn from_node_with_path<T: DeserializeOwned>(node: &Node<Value>) -> Result<T, FieldError> {
    let de = NodeDeserializer::new(node);
    match serde_path_to_error::deserialize::<_, T>(de) {
        Ok(v) => Ok(v),
        Err(err) => {
            let path = err.path().to_string();
            let field = err.path().iter().next().and_then(|segment| match segment {
                serde_path_to_error::Segment::Map { key } => Some(key.clone()),
                _ => None,
            });
            let message = err.into_inner().to_string();
            // a missing field fails on the parent, so name it from the message
            let field = field.or_else(|| missing_field(&message));
            Err(FieldError { path, field, message })
        }
    }
}

fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}
