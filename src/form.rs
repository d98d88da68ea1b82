//! Binding request data to a typed model.
//!
//! `Form<T>` is the factory-plus-result of one submission: the request data is
//! parsed into a tree, fields the request does not carry are taken from an
//! existing object, and the merged tree is deserialized into `T`. Any serde
//! default on `T` covers what neither side supplies.
//!
//! Browsers leave unchecked checkboxes out of a submission, so a `bool`
//! field the request does not carry reads as `false`, ahead of the existing
//! object. A sequence field submitted under its bare name several times
//! (`<select multiple>`) keeps every value.
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::builder::ParseOptions;
use crate::error::{Error, Result};
use crate::fields::{FieldKind, FieldSpec, inspect};
use crate::node::Node;
use crate::path_de::{FieldError, from_node_with_path};
use crate::source::{FormSource, parse_source};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormOptions {
    /// Bind only keys named `<prefix>.<field>`, as `<field>`.
    pub prefix: Option<String>,
    pub parse: ParseOptions,
}

impl FormOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        FormOptions { prefix: Some(prefix.into()), ..Self::default() }
    }
}

/// Per-field view of a bound form, for rendering it back.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    /// Submitted name, prefix included.
    pub name: String,
    /// Bound input, or `""` (`[]` for sequences) when there is none.
    pub value: Value,
    pub is_required: bool,
    pub is_multiple: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Form<T> {
    prefix: String,
    data: Node<Value>,
    fields: IndexMap<String, FormField>,
    model: Option<T>,
    error: Option<FieldError>,
    is_empty: bool,
}

impl<T: DeserializeOwned> Form<T> {
    /// A form nothing was submitted to. It is neither valid nor in error.
    pub fn empty(options: &FormOptions) -> Self {
        let prefix = prefix_of(options);
        let data = Node::empty_map();
        let fields = collect_fields(&inspect::<T>(), &prefix, &data, None);
        Form { prefix, data, fields, model: None, error: None, is_empty: true }
    }

    pub fn bind<S: FormSource + ?Sized>(source: &S, options: &FormOptions) -> Result<Self> {
        Self::bind_with_object(Some(source), None, options)
    }

    /// Bind request data, falling back to the fields of `object` for anything
    /// the request does not carry. With neither, the form stays empty.
    pub fn bind_with_object<S: FormSource + ?Sized>(
        source: Option<&S>,
        object: Option<&Value>,
        options: &FormOptions,
    ) -> Result<Self> {
        if source.is_none() && object.is_none() {
            return Ok(Self::empty(options));
        }
        let prefix = prefix_of(options);
        let specs = inspect::<T>();

        let mut data = match source {
            Some(source) => {
                let tree = parse_source(source, &options.parse)?.map_scalars(&mut Value::String);
                let mut tree = strip_prefix(tree, &prefix);
                if let Some(map) = tree.as_map_mut() {
                    apply_request_fields(map, source, &prefix, &specs);
                }
                tree
            }
            None => Node::empty_map(),
        };

        if let Some(object) = object {
            let Value::Object(fields) = object else {
                return Err(Error::NotAnObject { found: kind_of(object) });
            };
            if let Some(map) = data.as_map_mut() {
                for (name, value) in fields {
                    let missing = map.get(name).is_none_or(Node::is_empty_slot);
                    if missing {
                        map.insert(name.clone(), Node::from(value.clone()));
                    }
                }
            }
        }

        Ok(Self::validate(prefix, data, &specs))
    }

    fn validate(prefix: String, data: Node<Value>, specs: &[FieldSpec]) -> Self {
        let (model, error) = match from_node_with_path::<T>(&data) {
            Ok(model) => (Some(model), None),
            Err(error) => {
                debug!(%error, "form did not validate");
                (None, Some(error))
            }
        };
        let fields = collect_fields(specs, &prefix, &data, error.as_ref());
        Form { prefix, data, fields, model, error, is_empty: false }
    }
}

impl<T> Form<T> {
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn is_valid(&self) -> bool {
        self.model.is_some()
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    pub fn error(&self) -> Option<&FieldError> {
        self.error.as_ref()
    }

    pub fn model(&self) -> Option<&T> {
        self.model.as_ref()
    }

    /// The merged input tree, keyed by field name without the prefix.
    pub fn data(&self) -> &Node<Value> {
        &self.data
    }

    /// Raw input for one field.
    pub fn value(&self, field: &str) -> Option<&Node<Value>> {
        self.data.get(field)
    }

    /// Declared fields of `T`, keyed by field name without the prefix.
    pub fn fields(&self) -> &IndexMap<String, FormField> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.get(name)
    }

    /// The key a field is submitted under, prefix included.
    pub fn field_name(&self, field: &str) -> String {
        prefixed(&self.prefix, field)
    }

    /// The validated model.
    pub fn save(self) -> Result<T> {
        self.model.ok_or(Error::InvalidForm)
    }
}

impl<T: Serialize> Form<T> {
    /// Write the validated model's fields into an existing JSON object.
    pub fn update_object(&self, object: &mut Value) -> Result<()> {
        let model = self.model.as_ref().ok_or(Error::InvalidForm)?;
        let found = kind_of(object);
        let Value::Object(target) = object else {
            return Err(Error::NotAnObject { found });
        };
        match serde_json::to_value(model)? {
            Value::Object(fields) => {
                target.extend(fields);
                Ok(())
            }
            other => Err(Error::NotAnObject { found: kind_of(&other) }),
        }
    }
}

fn prefixed(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

/// Fill in what the parsed tree cannot express for top-level fields.
fn apply_request_fields<S: FormSource + ?Sized>(
    map: &mut IndexMap<String, Node<Value>>,
    source: &S,
    prefix: &str,
    specs: &[FieldSpec],
) {
    for spec in specs {
        match spec.kind {
            FieldKind::Flag if map.get(spec.name).is_none_or(Node::is_empty_slot) => {
                map.insert(spec.name.to_string(), Node::Scalar(Value::Bool(false)));
            }
            FieldKind::Many => {
                let values = source.get_all(&prefixed(prefix, spec.name));
                if values.len() > 1 {
                    let items = values.into_iter().map(|v| Node::Scalar(Value::String(v.into_owned()))).collect();
                    map.insert(spec.name.to_string(), Node::List(items));
                }
            }
            _ => {}
        }
    }
}

fn collect_fields(
    specs: &[FieldSpec],
    prefix: &str,
    data: &Node<Value>,
    error: Option<&FieldError>,
) -> IndexMap<String, FormField> {
    specs
        .iter()
        .map(|spec| {
            let value = match data.get(spec.name) {
                Some(node) if !node.is_empty_slot() => node.clone().into_json(),
                _ if spec.is_multiple() => Value::Array(Vec::new()),
                _ => Value::String(String::new()),
            };
            let error = error
                .filter(|e| e.field.as_deref() == Some(spec.name))
                .map(|e| e.message.clone());
            let field = FormField {
                name: prefixed(prefix, spec.name),
                value,
                is_required: spec.required,
                is_multiple: spec.is_multiple(),
                error,
            };
            (spec.name.to_string(), field)
        })
        .collect()
}

fn prefix_of(options: &FormOptions) -> String {
    options.prefix.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Keep root entries named `<prefix>.<field>` and rename them to `<field>`.
fn strip_prefix(tree: Node<Value>, prefix: &str) -> Node<Value> {
    if prefix.is_empty() {
        return tree;
    }
    match tree {
        Node::Map(map) => Node::Map(
            map.into_iter()
                .filter_map(|(key, node)| {
                    let field = key.strip_prefix(prefix)?.strip_prefix('.')?;
                    (!field.is_empty()).then(|| (field.to_string(), node))
                })
                .collect(),
        ),
        other => other,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Shape;
    use crate::source::MultiDict;
    use serde::Deserialize;
    use serde_json::json;

    const DEFAULT_AGE: u32 = 33;

    fn default_age() -> u32 {
        DEFAULT_AGE
    }

    #[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
    struct User {
        name: String,
        #[serde(default = "default_age")]
        age: u32,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn bind(query: &str) -> Form<User> {
        Form::bind(&MultiDict::from_query(query), &FormOptions::default()).unwrap()
    }

    #[test]
    fn empty_form_is_neither_valid_nor_failed() {
        let form = Form::<User>::bind_with_object::<MultiDict>(None, None, &FormOptions::default()).unwrap();
        assert!(form.is_empty());
        assert!(form.is_invalid());
        assert!(form.error().is_none());
        assert!(matches!(form.save(), Err(Error::InvalidForm)));
    }

    #[test]
    fn invalid_input_names_the_field() {
        let form = bind("age=nan");
        assert!(!form.is_empty());
        assert!(form.is_invalid());
        let error = form.error().unwrap();
        assert_eq!(error.field.as_deref(), Some("age"));
    }

    #[test]
    fn missing_required_field_is_reported() {
        let form = bind("age=20");
        assert_eq!(form.error().and_then(|e| e.field.as_deref()), Some("name"));
    }

    #[test]
    fn valid_input_is_coerced() {
        let form = bind("name=joe&age=20&tags=a");
        assert!(form.is_valid());
        assert_eq!(form.value("age"), Some(&Node::Scalar(json!("20"))));
        assert_eq!(
            form.save().unwrap(),
            User { name: "joe".into(), age: 20, tags: vec!["a".into()] }
        );
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let user = bind("name=joe").save().unwrap();
        assert_eq!(user, User { name: "joe".into(), age: DEFAULT_AGE, tags: vec![] });
    }

    #[test]
    fn repeated_and_bracketed_lists() {
        let user = bind("name=joe&tags[]=a&tags[]=b").save().unwrap();
        assert_eq!(user.tags, vec!["a", "b"]);
        let user = bind("name=joe&tags[1]=b&tags[0]=a").save().unwrap();
        assert_eq!(user.tags, vec!["a", "b"]);
        let user = bind("name=joe&name=bob").save().unwrap();
        assert_eq!(user.name, "bob");
    }

    #[test]
    fn prefix_selects_and_strips_keys() {
        let data = MultiDict::from_query("u1.name=joe&u1.age=20&u1.tags[]=a&u2.name=ann&name=x");
        let form = Form::<User>::bind(&data, &FormOptions::with_prefix("u1")).unwrap();
        assert_eq!(form.field_name("name"), "u1.name");
        assert_eq!(
            form.save().unwrap(),
            User { name: "joe".into(), age: 20, tags: vec!["a".into()] }
        );

        let form = Form::<User>::bind(&data, &FormOptions::with_prefix("u2")).unwrap();
        assert_eq!(form.model().map(|u| u.name.as_str()), Some("ann"));
    }

    #[test]
    fn existing_object_fills_gaps() {
        let object = json!({"name": "old", "age": 40, "tags": ["keep"]});
        let data = MultiDict::from_query("age=41");
        let form = Form::<User>::bind_with_object(Some(&data), Some(&object), &FormOptions::default()).unwrap();
        assert_eq!(
            form.save().unwrap(),
            User { name: "old".into(), age: 41, tags: vec!["keep".into()] }
        );

        let form = Form::<User>::bind_with_object::<MultiDict>(None, Some(&object), &FormOptions::default()).unwrap();
        assert_eq!(form.model().map(|u| u.age), Some(40));
    }

    #[test]
    fn non_object_fallback_is_rejected() {
        let data = MultiDict::from_query("name=joe");
        let err = Form::<User>::bind_with_object(Some(&data), Some(&json!([1])), &FormOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NotAnObject { found: "array" }));
    }

    #[test]
    fn update_object_merges_model_fields() {
        let mut object = json!({"id": 7, "name": "old"});
        let form = bind("name=new&age=5");
        form.update_object(&mut object).unwrap();
        assert_eq!(object, json!({"id": 7, "name": "new", "age": 5, "tags": []}));

        let invalid = bind("age=x");
        assert!(matches!(invalid.update_object(&mut object), Err(Error::InvalidForm)));
        assert!(matches!(form.update_object(&mut json!("s")), Err(Error::NotAnObject { found: "string" })));
    }

    #[test]
    fn nested_models_bind_from_brackets() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Header {
            name: String,
            value: String,
        }
        #[derive(Debug, Deserialize, PartialEq)]
        struct Request {
            url: String,
            #[serde(default)]
            follow: bool,
            headers: Vec<Header>,
        }
        let data = MultiDict::from_query(
            "url=%2Fa&follow=on&headers[1][name]=b&headers[1][value]=2&headers[0][name]=a&headers[0][value]=1",
        );
        let request = Form::<Request>::bind(&data, &FormOptions::default()).unwrap().save().unwrap();
        assert_eq!(request.url, "/a");
        assert!(request.follow);
        assert_eq!(request.headers[0], Header { name: "a".into(), value: "1".into() });
        assert_eq!(request.headers[1].name, "b");
    }

    #[test]
    fn tree_conflicts_surface_as_errors() {
        let data = MultiDict::from_query("name=joe&tags[]=a&tags[x]=b");
        let err = Form::<User>::bind(&data, &FormOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::PathConflict { expected: Shape::Map, found: Shape::List, .. }
        ));
    }

    #[test]
    fn unchecked_checkbox_reads_false() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Consent {
            agree: bool,
        }
        let consent = Form::<Consent>::bind(&MultiDict::from_query("other=1"), &FormOptions::default()).unwrap();
        assert_eq!(consent.save().unwrap(), Consent { agree: false });

        let consent = Form::<Consent>::bind(&MultiDict::from_query("agree="), &FormOptions::default()).unwrap();
        assert_eq!(consent.save().unwrap(), Consent { agree: true });
    }

    #[test]
    fn unchecked_checkbox_overrides_default_and_object() {
        fn checked() -> bool {
            true
        }
        #[derive(Debug, Deserialize, PartialEq)]
        struct Prefs {
            #[serde(default = "checked")]
            subscribe: bool,
            #[serde(default)]
            tags: Vec<String>,
        }
        let data = MultiDict::from_query("tags[]=x");
        let prefs = Form::<Prefs>::bind(&data, &FormOptions::default()).unwrap().save().unwrap();
        assert!(!prefs.subscribe);

        let object = json!({"subscribe": true, "tags": ["old"]});
        let prefs = Form::<Prefs>::bind_with_object(Some(&data), Some(&object), &FormOptions::default())
            .unwrap()
            .save()
            .unwrap();
        assert_eq!(prefs, Prefs { subscribe: false, tags: vec!["x".into()] });

        let prefs = Form::<Prefs>::bind_with_object::<MultiDict>(None, Some(&object), &FormOptions::default())
            .unwrap()
            .save()
            .unwrap();
        assert!(prefs.subscribe);
    }

    #[test]
    fn repeated_bare_key_keeps_every_value() {
        let user = bind("name=joe&tags=a&tags=b").save().unwrap();
        assert_eq!(user.tags, vec!["a", "b"]);

        let data = MultiDict::from_query("u1.name=joe&u1.tags=a&u1.tags=b&tags=z");
        let user = Form::<User>::bind(&data, &FormOptions::with_prefix("u1")).unwrap().save().unwrap();
        assert_eq!(user.tags, vec!["a", "b"]);
    }

    #[test]
    fn empty_form_lists_fields_with_blank_values() {
        let form = Form::<User>::empty(&FormOptions::with_prefix("u1"));
        let names: Vec<_> = form.fields().keys().map(String::as_str).collect();
        assert_eq!(names, ["name", "age", "tags"]);

        let name = form.field("name").unwrap();
        assert_eq!(name.name, "u1.name");
        assert_eq!(name.value, json!(""));
        assert!(name.is_required);
        assert!(!name.is_multiple);
        assert_eq!(name.error, None);

        let tags = form.field("tags").unwrap();
        assert_eq!(tags.value, json!([]));
        assert!(tags.is_multiple);
        assert!(!tags.is_required);
        assert!(!form.field("age").unwrap().is_required);
    }

    #[test]
    fn bound_fields_carry_values_and_errors() {
        let form = bind("age=nan&tags=a&tags=b");
        let age = form.field("age").unwrap();
        assert_eq!(age.value, json!("nan"));
        assert!(age.error.as_deref().is_some_and(|m| m.contains("nan")));
        assert_eq!(form.field("tags").unwrap().value, json!(["a", "b"]));
        assert_eq!(form.field("name").unwrap().value, json!(""));
        assert_eq!(form.field("name").unwrap().error, None);
    }
}
