//! Error type shared by the tokenizer, the tree builder and the form glue.
use crate::node::Shape;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A key implies a container shape that disagrees with what an earlier key already put there.
    #[error("key `{key}` expects a {expected} at `{at}` but an earlier key left a {found} there")]
    PathConflict {
        key: String,
        at: String,
        expected: Shape,
        found: Shape,
    },

    #[error("key `{key}` uses index {index}, above the limit of {limit} (raise `max_index` to accept it)")]
    IndexTooLarge {
        key: String,
        index: usize,
        limit: usize,
    },

    /// Paths handed to the builder must start with a field name.
    #[error("key `{key}` does not start with a field name")]
    RootNotField { key: String },

    #[error("form is not valid")]
    InvalidForm,

    #[error("existing object is not a JSON object (found {found})")]
    NotAnObject { found: &'static str },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
