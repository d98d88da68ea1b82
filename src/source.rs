//! Request-data adapters.
//!
//! Anything that can answer "first value for a key", "all values for a key"
//! and "which keys are there" can feed the parser. The concrete container is
//! picked once, by the `FormSource` impl, instead of probing per access.
use std::borrow::Cow;
use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::builder::{ParseOptions, Values, parse_with};
use crate::error::Result;
use crate::node::Node;

pub trait FormSource {
    /// First value submitted for `key`.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    /// Every value submitted for `key`, in submission order.
    fn get_all(&self, key: &str) -> Vec<Cow<'_, str>>;

    /// Distinct keys, in the order the source yields them.
    fn keys(&self) -> Vec<&str>;
}

/// Group a source into the flat mapping the tree builder consumes.
pub fn to_flat<S: FormSource + ?Sized>(source: &S) -> IndexMap<String, Values<String>> {
    source
        .keys()
        .into_iter()
        .map(|key| {
            let values = source.get_all(key).into_iter().map(Cow::into_owned).collect();
            (key.to_string(), Values::Many(values))
        })
        .collect()
}

pub fn parse_source<S: FormSource + ?Sized>(source: &S, options: &ParseOptions) -> Result<Node<String>> {
    parse_with(to_flat(source), options)
}

// ------------------------------- MultiDict -------------------------------- //

/// Ordered key/value pairs where a key may repeat, as submitted by a browser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiDict {
    pairs: Vec<(String, String)>,
}

impl MultiDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `application/x-www-form-urlencoded` body or query string.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MultiDict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        MultiDict {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl FormSource for MultiDict {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| Cow::Borrowed(v))
    }

    fn get_all(&self, key: &str) -> Vec<Cow<'_, str>> {
        self.iter().filter(|(k, _)| *k == key).map(|(_, v)| Cow::Borrowed(v)).collect()
    }

    fn keys(&self) -> Vec<&str> {
        let mut seen = indexmap::IndexSet::new();
        for (k, _) in self.iter() {
            seen.insert(k);
        }
        seen.into_iter().collect()
    }
}

// ------------------------------- Maps ------------------------------------- //

impl FormSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        HashMap::get(self, key).map(|v| Cow::Borrowed(v.as_str()))
    }

    fn get_all(&self, key: &str) -> Vec<Cow<'_, str>> {
        FormSource::get(self, key).into_iter().collect()
    }

    fn keys(&self) -> Vec<&str> {
        HashMap::keys(self).map(String::as_str).collect()
    }
}

impl FormSource for IndexMap<String, String> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        IndexMap::get(self, key).map(|v| Cow::Borrowed(v.as_str()))
    }

    fn get_all(&self, key: &str) -> Vec<Cow<'_, str>> {
        FormSource::get(self, key).into_iter().collect()
    }

    fn keys(&self) -> Vec<&str> {
        IndexMap::keys(self).map(String::as_str).collect()
    }
}

impl FormSource for IndexMap<String, Vec<String>> {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        IndexMap::get(self, key)?.first().map(|v| Cow::Borrowed(v.as_str()))
    }

    fn get_all(&self, key: &str) -> Vec<Cow<'_, str>> {
        IndexMap::get(self, key)
            .map(|vs| vs.iter().map(|v| Cow::Borrowed(v.as_str())).collect())
            .unwrap_or_default()
    }

    fn keys(&self) -> Vec<&str> {
        IndexMap::keys(self).map(String::as_str).collect()
    }
}

// ------------------------------- JSON objects ----------------------------- //

/// A flat JSON object: `{"key": "v"}` or `{"key": ["v1", "v2"]}`.
///
/// Numbers and booleans are read as their JSON text; `null` and nested
/// objects count as absent. Anything that is not an object has no keys.
impl FormSource for Value {
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        FormSource::get_all(self, key).into_iter().next()
    }

    fn get_all(&self, key: &str) -> Vec<Cow<'_, str>> {
        match Value::get(self, key) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            Some(other) => scalar_text(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn keys(&self) -> Vec<&str> {
        self.as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

fn scalar_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// ------------------------------- Tests ------------------------------------ //
