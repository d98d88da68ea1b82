//! Tree builder.
//!
//! Grows a single nested tree from `(key, values)` pairs. Each key is
//! tokenized once and every value for it is inserted in turn, so a repeated
//! key fans out into list elements for `[]` / `[n]` paths and degenerates to
//! last-write-wins for paths ending in a field.
//!
//! A node's shape is decided lazily from the segment that follows it: a field
//! makes it a mapping, an index or `[]` makes it a sequence.
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::node::{Node, Shape};
use crate::path::{KeyPath, Segment};

// ------------------------------- Policy ---------------------------------- //

pub const DEFAULT_MAX_INDEX: usize = 10_000;

/// Largest index a sequence can be grown to, whatever `max_index` says.
pub const MAX_ADDRESSABLE_INDEX: usize = usize::MAX - 1;

/// What to do when a key implies a shape that disagrees with the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail with [`Error::PathConflict`].
    #[default]
    Reject,
    /// Throw away whatever is in the slot and start over with the new shape.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub conflicts: ConflictPolicy,
    /// Largest accepted `[n]`; `None` accepts any index.
    pub max_index: Option<usize>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            conflicts: ConflictPolicy::default(),
            max_index: Some(DEFAULT_MAX_INDEX),
        }
    }
}

// ------------------------------- Values ---------------------------------- //

/// The value side of one flat entry: a single scalar or a list of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Values<V> {
    One(V),
    /// Inserted in order. An empty list inserts nothing.
    Many(Vec<V>),
}

impl<V> Values<V> {
    pub fn into_vec(self) -> Vec<V> {
        match self {
            Values::One(v) => vec![v],
            Values::Many(vs) => vs,
        }
    }
}

impl<V> From<Vec<V>> for Values<V> {
    fn from(values: Vec<V>) -> Self {
        Values::Many(values)
    }
}

impl<V> IntoIterator for Values<V> {
    type Item = V;
    type IntoIter = std::vec::IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

// ------------------------------- Builder --------------------------------- //

#[derive(Debug, Clone)]
pub struct TreeBuilder<V> {
    root: Node<V>,
    options: ParseOptions,
}

impl<V> Default for TreeBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TreeBuilder<V> {
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        TreeBuilder { root: Node::empty_map(), options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn root(&self) -> &Node<V> {
        &self.root
    }

    /// Hand the tree over. The root is always a mapping.
    pub fn finish(self) -> Node<V> {
        self.root
    }

    /// Tokenize `key` and insert each value at its path.
    ///
    /// Keys without a root field are skipped without error.
    pub fn insert_values(&mut self, key: &str, values: Values<V>) -> Result<()> {
        let path = KeyPath::parse(key);
        if path.is_empty() {
            debug!(key, "skipping key without a root field");
            return Ok(());
        }
        for value in values {
            self.insert(&path, value)?;
        }
        Ok(())
    }

    /// Write `value` at `path`, creating intermediate containers on the way.
    pub fn insert(&mut self, path: &KeyPath, value: V) -> Result<()> {
        let segments = path.segments();
        let (Some(Segment::Field(_)), Some((last, walk))) = (segments.first(), segments.split_last()) else {
            return Err(Error::RootNotField { key: path.key().to_string() });
        };
        trace!(key = path.key(), depth = segments.len(), "insert");

        let options = &self.options;
        let mut node = &mut self.root;
        for (depth, segment) in walk.iter().enumerate() {
            let step = Step { path, depth, options };
            let child = segments[depth + 1].container_shape();
            node = descend(node, segment, child, &step)?;
        }
        let step = Step { path, depth: walk.len(), options };
        write_leaf(node, last, value, &step)
    }
}

/// Build a tree from flat entries with default options.
pub fn parse<K, V, I>(flat: I) -> Result<Node<V>>
where
    I: IntoIterator<Item = (K, Values<V>)>,
    K: AsRef<str>,
{
    parse_with(flat, &ParseOptions::default())
}

pub fn parse_with<K, V, I>(flat: I, options: &ParseOptions) -> Result<Node<V>>
where
    I: IntoIterator<Item = (K, Values<V>)>,
    K: AsRef<str>,
{
    let mut builder = TreeBuilder::with_options(options.clone());
    for (key, values) in flat {
        builder.insert_values(key.as_ref(), values)?;
    }
    Ok(builder.finish())
}

// ------------------------------- Walking --------------------------------- //

/// Where the walk is: segment `depth` of `path`.
struct Step<'a> {
    path: &'a KeyPath,
    depth: usize,
    options: &'a ParseOptions,
}

impl Step<'_> {
    /// `prefix` is the number of segments leading to the offending slot.
    fn conflict(&self, prefix: usize, expected: Shape, found: Shape) -> Error {
        Error::PathConflict {
            key: self.path.key().to_string(),
            at: self.path.render_prefix(prefix),
            expected,
            found,
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let limit = self.options.max_index.map_or(MAX_ADDRESSABLE_INDEX, |limit| limit.min(MAX_ADDRESSABLE_INDEX));
        if index > limit {
            return Err(Error::IndexTooLarge {
                key: self.path.key().to_string(),
                index,
                limit,
            });
        }
        Ok(())
    }
}

fn descend<'n, V>(node: &'n mut Node<V>, segment: &Segment, child: Shape, step: &Step<'_>) -> Result<&'n mut Node<V>> {
    let slot = match segment {
        Segment::Field(name) => member(node, name, step)?,
        Segment::Index(index) => position(node, *index, step)?,
        Segment::Append => {
            let items = sequence(node, step)?;
            items.push(Node::container(child));
            let last = items.len() - 1;
            return Ok(&mut items[last]);
        }
    };
    shape_slot(slot, child, step)?;
    Ok(slot)
}

fn write_leaf<V>(node: &mut Node<V>, segment: &Segment, value: V, step: &Step<'_>) -> Result<()> {
    let slot = match segment {
        Segment::Field(name) => member(node, name, step)?,
        Segment::Index(index) => position(node, *index, step)?,
        Segment::Append => {
            sequence(node, step)?.push(Node::Scalar(value));
            return Ok(());
        }
    };
    if slot.is_container() {
        let found = slot.shape();
        match step.options.conflicts {
            ConflictPolicy::Reject => return Err(step.conflict(step.depth + 1, Shape::Scalar, found)),
            ConflictPolicy::Replace => {
                debug!(key = step.path.key(), %found, "overwriting container with a scalar");
            }
        }
    }
    *slot = Node::Scalar(value);
    Ok(())
}

/// Make `slot` a container of `shape`, creating it if it is still empty.
fn shape_slot<V>(slot: &mut Node<V>, shape: Shape, step: &Step<'_>) -> Result<()> {
    let found = slot.shape();
    if found == shape {
        return Ok(());
    }
    if found != Shape::Empty {
        match step.options.conflicts {
            ConflictPolicy::Reject => return Err(step.conflict(step.depth + 1, shape, found)),
            ConflictPolicy::Replace => {
                debug!(key = step.path.key(), %found, expected = %shape, "replacing slot");
            }
        }
    }
    *slot = Node::container(shape);
    Ok(())
}

fn member<'n, V>(node: &'n mut Node<V>, name: &str, step: &Step<'_>) -> Result<&'n mut Node<V>> {
    let found = node.shape();
    let map = node
        .as_map_mut()
        .ok_or_else(|| step.conflict(step.depth, Shape::Map, found))?;
    Ok(map.entry(name.to_string()).or_default())
}

/// Slot `index` of a sequence, padding with empty slots up to it.
fn position<'n, V>(node: &'n mut Node<V>, index: usize, step: &Step<'_>) -> Result<&'n mut Node<V>> {
    step.check_index(index)?;
    let items = sequence(node, step)?;
    let len = index
        .checked_add(1)
        .ok_or_else(|| Error::IndexTooLarge { key: step.path.key().to_string(), index, limit: MAX_ADDRESSABLE_INDEX })?;
    if items.len() < len {
        items.resize_with(len, Node::default);
    }
    Ok(&mut items[index])
}

fn sequence<'n, V>(node: &'n mut Node<V>, step: &Step<'_>) -> Result<&'n mut Vec<Node<V>>> {
    let found = node.shape();
    node.as_list_mut()
        .ok_or_else(|| step.conflict(step.depth, Shape::List, found))
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn many<V>(values: impl IntoIterator<Item = V>) -> Values<V> {
        Values::Many(values.into_iter().collect())
    }

    fn to_json<V: serde::Serialize>(tree: &Node<V>) -> Value {
        serde_json::to_value(tree).unwrap()
    }

    fn replacing() -> ParseOptions {
        ParseOptions { conflicts: ConflictPolicy::Replace, ..ParseOptions::default() }
    }

    #[test]
    fn single_simple_key() {
        let tree = parse([("foo", many(["bar"]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"foo": "bar"}));
    }

    #[test]
    fn empty_input_is_empty_mapping() {
        let tree = parse(Vec::<(&str, Values<i32>)>::new()).unwrap();
        assert_eq!(tree, Node::empty_map());
    }

    #[test]
    fn basic_nested() {
        let tree = parse([("a[b][c]", many([1]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn sparse_indices_are_padded() {
        let tree = parse([
            ("arr[0]", many(["x"])),
            ("arr[1]", many(["y"])),
            ("arr[5]", many(["z"])),
        ])
        .unwrap();
        let items = tree.get("arr").and_then(Node::as_list).unwrap();
        assert_eq!(items.len(), 6);
        assert!(items[2..5].iter().all(Node::is_empty_slot));
        assert_eq!(to_json(&tree), json!({"arr": ["x", "y", null, null, null, "z"]}));
    }

    #[test]
    fn append_fans_out_in_input_order() {
        let tree = parse([("items[]", many(["p", "q", "r"]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"items": ["p", "q", "r"]}));
    }

    #[test]
    fn single_value_is_one_insertion() {
        let tree = parse([("items[]", Values::One("p")), ("name", Values::One("n"))]).unwrap();
        assert_eq!(to_json(&tree), json!({"items": ["p"], "name": "n"}));
    }

    #[test]
    fn empty_value_list_inserts_nothing() {
        let tree = parse([("items[]", many(Vec::<&str>::new())), ("name", many(Vec::new()))]).unwrap();
        assert_eq!(to_json(&tree), json!({}));
    }

    #[test]
    fn repeated_field_is_last_write_wins() {
        let tree = parse([("name", many(["a", "b", "c"]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"name": "c"}));
    }

    #[test]
    fn repeated_index_overwrites_same_slot() {
        let tree = parse([("arr[1]", many(["a", "b"]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"arr": [null, "b"]}));
    }

    #[test]
    fn mixed_dict_and_list() {
        let tree = parse([
            ("user[name]", many([json!("Alice")])),
            ("user[roles][]", many([json!("admin"), json!("user")])),
            ("user[scores][0]", many([json!(10)])),
            ("user[scores][2]", many([json!(30)])),
            ("user[scores][1]", many([json!(20)])),
        ])
        .unwrap();
        assert_eq!(
            tree.into_json(),
            json!({"user": {"name": "Alice", "roles": ["admin", "user"], "scores": [10, 20, 30]}})
        );
    }

    #[test]
    fn independent_branches_do_not_interfere() {
        let tree = parse([
            ("a[x]", many([json!(100)])),
            ("b[y]", many([json!(200)])),
            ("c[]", many([json!("foo"), json!("bar")])),
        ])
        .unwrap();
        assert_eq!(
            tree.into_json(),
            json!({"a": {"x": 100}, "b": {"y": 200}, "c": ["foo", "bar"]})
        );
    }

    #[test]
    fn out_of_order_indices_land_by_index() {
        let tree = parse([
            ("person[name]", many(["Bob"])),
            ("person[tags][]", many(["x", "y"])),
            ("person[address][city]", many(["Lima"])),
            ("person[address][zip]", many(["05001"])),
            ("headers[0][name]", many(["h1"])),
            ("headers[0][value]", many(["v1"])),
            ("headers[2][name]", many(["h3"])),
            ("headers[2][value]", many(["v3"])),
            ("headers[1][name]", many(["h2"])),
            ("headers[1][value]", many(["v2"])),
        ])
        .unwrap();
        assert_eq!(
            to_json(&tree),
            json!({
                "person": {
                    "name": "Bob",
                    "tags": ["x", "y"],
                    "address": {"city": "Lima", "zip": "05001"},
                },
                "headers": [
                    {"name": "h1", "value": "v1"},
                    {"name": "h2", "value": "v2"},
                    {"name": "h3", "value": "v3"},
                ],
            })
        );
    }

    #[test]
    fn append_then_field_builds_list_of_maps() {
        let tree = parse([("rows[][id]", many(["1", "2"])), ("grid[][]", many(["a"]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"rows": [{"id": "1"}, {"id": "2"}], "grid": [["a"]]}));
    }

    #[test]
    fn malformed_keys_are_skipped() {
        let tree = parse([
            ("", many(["x"])),
            ("[no_root]", many(["y"])),
            ("   ", many(["z"])),
            ("ok", many(["w"])),
        ])
        .unwrap();
        assert_eq!(to_json(&tree), json!({"ok": "w"}));
    }

    #[test]
    fn parse_is_deterministic() {
        let flat = vec![
            ("a[b][]".to_string(), many(["1", "2"])),
            ("a[c]".to_string(), many(["3"])),
            ("z[3]".to_string(), many(["4"])),
        ];
        let first = parse(flat.clone()).unwrap();
        let second = parse(flat).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn field_targets_depend_on_key_order() {
        let forward = parse([("name", many(["first"])), ("name ", many(["second"]))]).unwrap();
        let backward = parse([("name ", many(["second"])), ("name", many(["first"]))]).unwrap();
        assert_eq!(to_json(&forward), json!({"name": "second"}));
        assert_eq!(to_json(&backward), json!({"name": "first"}));
    }

    #[test]
    fn append_order_follows_key_order() {
        let tree = parse([("t[]", many(["b"])), ("t [] ", many(["a"]))]).unwrap();
        assert_eq!(to_json(&tree), json!({"t": ["b", "a"]}));
    }

    #[test]
    fn scalar_under_new_mapping_is_rejected() {
        let err = parse([("a", many(["1"])), ("a[b]", many(["2"]))]).unwrap_err();
        match err {
            Error::PathConflict { key, at, expected, found } => {
                assert_eq!(key, "a[b]");
                assert_eq!(at, "a");
                assert_eq!(expected, Shape::Map);
                assert_eq!(found, Shape::Scalar);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sequence_reused_as_mapping_is_rejected() {
        let err = parse([("x[]", many(["1"])), ("x[a]", many(["2"]))]).unwrap_err();
        assert!(matches!(
            err,
            Error::PathConflict { expected: Shape::Map, found: Shape::List, .. }
        ));

        let err = parse([("x[0][a]", many(["1"])), ("x[0][]", many(["2"]))]).unwrap_err();
        match err {
            Error::PathConflict { at, expected, found, .. } => {
                assert_eq!(at, "x[0]");
                assert_eq!(expected, Shape::List);
                assert_eq!(found, Shape::Map);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn scalar_over_container_is_rejected() {
        let err = parse([("a[b]", many(["1"])), ("a", many(["2"]))]).unwrap_err();
        assert!(matches!(
            err,
            Error::PathConflict { expected: Shape::Scalar, found: Shape::Map, .. }
        ));
        assert!(err.to_string().contains("`a`"));
    }

    #[test]
    fn replace_policy_resets_slots() {
        let options = replacing();
        let tree = parse_with([("a", many(["1"])), ("a[b]", many(["2"]))], &options).unwrap();
        assert_eq!(to_json(&tree), json!({"a": {"b": "2"}}));

        let tree = parse_with([("x[]", many(["1"])), ("x[a]", many(["2"]))], &options).unwrap();
        assert_eq!(to_json(&tree), json!({"x": {"a": "2"}}));

        let tree = parse_with([("a[b]", many(["1"])), ("a", many(["2"]))], &options).unwrap();
        assert_eq!(to_json(&tree), json!({"a": "2"}));
    }

    #[test]
    fn index_limit_is_enforced() {
        let options = ParseOptions { max_index: Some(3), ..ParseOptions::default() };
        let tree = parse_with([("a[3]", many(["x"]))], &options).unwrap();
        assert_eq!(to_json(&tree), json!({"a": [null, null, null, "x"]}));

        let err = parse_with([("a[4][b]", many(["x"]))], &options).unwrap_err();
        assert!(matches!(err, Error::IndexTooLarge { index: 4, limit: 3, .. }));

        let err = parse([("a[99999999999999999999999]", many(["x"]))]).unwrap_err();
        assert!(matches!(err, Error::IndexTooLarge { index: usize::MAX, .. }));
    }

    #[test]
    fn index_limit_can_be_lifted() {
        let options = ParseOptions { max_index: None, ..ParseOptions::default() };
        let tree = parse_with([("a[20000]", many([1]))], &options).unwrap();
        assert_eq!(tree.get("a").and_then(Node::as_list).map(<[_]>::len), Some(20001));
    }

    #[test]
    fn unlimited_index_still_rejects_overflow() {
        let options = ParseOptions { max_index: None, ..ParseOptions::default() };
        let err = parse_with([("a[99999999999999999999999]", Values::One(1))], &options).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexTooLarge { index: usize::MAX, limit: MAX_ADDRESSABLE_INDEX, .. }
        ));
        assert!(err.to_string().contains("max_index"));

        let path = KeyPath::from_segments(vec![Segment::Field("a".into()), Segment::Index(usize::MAX), Segment::Append]);
        let err = TreeBuilder::with_options(options).insert(&path, 1).unwrap_err();
        assert!(matches!(err, Error::IndexTooLarge { index: usize::MAX, .. }));
    }

    #[test]
    fn insert_requires_root_field() {
        let mut builder = TreeBuilder::new();
        let path = KeyPath::from_segments(vec![Segment::Index(0)]);
        let err = builder.insert(&path, 1).unwrap_err();
        assert!(matches!(err, Error::RootNotField { .. }));

        let err = builder.insert(&KeyPath::parse("[x]"), 1).unwrap_err();
        assert!(matches!(err, Error::RootNotField { .. }));
        assert_eq!(builder.finish(), Node::empty_map());
    }

    #[test]
    fn builder_accumulates_across_calls() {
        let mut builder = TreeBuilder::new();
        builder.insert(&KeyPath::parse("a[]"), "1").unwrap();
        builder.insert_values("a[]", Values::Many(vec!["2", "3"])).unwrap();
        builder.insert_values("[skip]", Values::One("4")).unwrap();
        assert_eq!(to_json(builder.root()), json!({"a": ["1", "2", "3"]}));
    }
}
