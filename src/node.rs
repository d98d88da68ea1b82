//! The nested value tree produced by the builder.
use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

use crate::path::Segment;

/// A node of the result tree.
///
/// `Empty` is the explicit placeholder used for sequence slots nobody wrote
/// (and for a freshly created slot whose shape is not decided yet).
#[derive(Debug, Clone, PartialEq)]
pub enum Node<V> {
    Empty,
    Scalar(V),
    Map(IndexMap<String, Node<V>>),
    List(Vec<Node<V>>),
}

/// The kind of a node, without its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Empty,
    Scalar,
    Map,
    List,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::Empty => "empty slot",
            Shape::Scalar => "scalar",
            Shape::Map => "mapping",
            Shape::List => "sequence",
        })
    }
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Node::Empty
    }
}

impl<V> Node<V> {
    pub fn empty_map() -> Self {
        Node::Map(IndexMap::new())
    }

    /// A fresh, empty node of the given shape.
    pub fn container(shape: Shape) -> Self {
        match shape {
            Shape::Map => Node::Map(IndexMap::new()),
            Shape::List => Node::List(Vec::new()),
            Shape::Empty | Shape::Scalar => Node::Empty,
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Node::Empty => Shape::Empty,
            Node::Scalar(_) => Shape::Scalar,
            Node::Map(_) => Shape::Map,
            Node::List(_) => Shape::List,
        }
    }

    pub fn is_empty_slot(&self) -> bool {
        matches!(self, Node::Empty)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Map(_) | Node::List(_))
    }

    pub fn as_scalar(&self) -> Option<&V> {
        match self {
            Node::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node<V>>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Node<V>>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node<V>]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Node<V>>> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Member `name` of a mapping node.
    pub fn get(&self, name: &str) -> Option<&Node<V>> {
        self.as_map()?.get(name)
    }

    /// Follow `segments` from this node. `Append` never resolves.
    pub fn lookup(&self, segments: &[Segment]) -> Option<&Node<V>> {
        segments.iter().try_fold(self, |node, segment| match segment {
            Segment::Field(name) => node.get(name),
            Segment::Index(i) => node.as_list()?.get(*i),
            Segment::Append => None,
        })
    }

    /// Rebuild the tree with every scalar passed through `f`.
    pub fn map_scalars<U>(self, f: &mut impl FnMut(V) -> U) -> Node<U> {
        match self {
            Node::Empty => Node::Empty,
            Node::Scalar(v) => Node::Scalar(f(v)),
            Node::Map(map) => Node::Map(map.into_iter().map(|(k, n)| (k, n.map_scalars(&mut *f))).collect()),
            Node::List(items) => Node::List(items.into_iter().map(|n| n.map_scalars(&mut *f)).collect()),
        }
    }
}

impl<V: Into<Value>> Node<V> {
    /// Convert to a JSON value; empty slots become `null`.
    pub fn into_json(self) -> Value {
        match self {
            Node::Empty => Value::Null,
            Node::Scalar(v) => v.into(),
            Node::Map(map) => Value::Object(map.into_iter().map(|(k, n)| (k, n.into_json())).collect()),
            Node::List(items) => Value::Array(items.into_iter().map(Node::into_json).collect()),
        }
    }
}

impl From<Value> for Node<Value> {
    /// `null` becomes an empty slot; objects and arrays become containers.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Empty,
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect()),
            scalar => Node::Scalar(scalar),
        }
    }
}

impl<V: Serialize> Serialize for Node<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Empty => serializer.serialize_unit(),
            Node::Scalar(v) => v.serialize(serializer),
            Node::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Node::List(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(item)?;
                }
                out.end()
            }
        }
    }
}

// ------------------------------- Tests ------------------------------------ //
