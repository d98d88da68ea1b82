//! Rebuild nested data from flat, bracket-annotated form keys.
//!
//! ```
//! use formnest::{Values, parse};
//!
//! let tree = parse([
//!     ("person[name]", Values::One("Bob")),
//!     ("person[tags][]", Values::Many(vec!["x", "y"])),
//!     ("rows[2][id]", Values::One("r3")),
//! ])
//! .unwrap();
//!
//! assert_eq!(
//!     tree.into_json(),
//!     serde_json::json!({
//!         "person": {"name": "Bob", "tags": ["x", "y"]},
//!         "rows": [null, null, {"id": "r3"}],
//!     })
//! );
//! ```
pub mod builder;
pub mod de;
pub mod error;
pub mod fields;
pub mod form;
pub mod node;
pub mod path;
pub mod path_de;
pub mod source;

pub use builder::{ConflictPolicy, ParseOptions, TreeBuilder, Values, parse, parse_with};
pub use error::{Error, Result};
pub use fields::{FieldKind, FieldSpec};
pub use form::{Form, FormField, FormOptions};
pub use node::{Node, Shape};
pub use path::{KeyPath, Segment, tokenize};
pub use path_de::FieldError;
pub use source::{FormSource, MultiDict, parse_source, to_flat};
