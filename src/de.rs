//! serde `Deserializer` over a parsed tree.
//!
//! Form submissions only carry strings, so string scalars are converted on
//! demand into whatever the target type asks for (`"20"` into a `u32`, `"on"`
//! into a `bool`). Non-string scalars, e.g. ones merged in from an existing
//! JSON object, go through `serde_json`'s own deserializer untouched.
//!
//! A lone scalar where a sequence is expected reads as a one-element
//! sequence, and an empty slot or blank string reads as `None`.
use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess, Unexpected, VariantAccess, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::Value;

use crate::node::Node;

type Error = serde_json::Error;

pub fn from_node<'de, T: de::Deserialize<'de>>(node: &'de Node<Value>) -> Result<T, Error> {
    T::deserialize(NodeDeserializer::new(node))
}

/// Text accepted for `true` / `false`. A bare checkbox submits `""` or `"on"`.
pub fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "" | "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeDeserializer<'de> {
    node: &'de Node<Value>,
}

impl<'de> NodeDeserializer<'de> {
    pub fn new(node: &'de Node<Value>) -> Self {
        NodeDeserializer { node }
    }

    fn unexpected(&self) -> Unexpected<'de> {
        match self.node {
            Node::Empty => Unexpected::Unit,
            Node::Scalar(Value::String(s)) => Unexpected::Str(s),
            Node::Scalar(Value::Bool(b)) => Unexpected::Bool(*b),
            Node::Scalar(_) => Unexpected::Other("scalar"),
            Node::Map(_) => Unexpected::Map,
            Node::List(_) => Unexpected::Seq,
        }
    }

    fn visit_map<V: Visitor<'de>>(map: &'de indexmap::IndexMap<String, Node<Value>>, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(MapNodes { iter: Some(map.iter()), value: None })
    }

    fn visit_seq<V: Visitor<'de>>(items: &'de [Node<Value>], visitor: V) -> Result<V::Value, Error> {
        visitor.visit_seq(SeqNodes { iter: items.iter() })
    }
}

macro_rules! deserialize_parsed {
    ($($method:ident => $visit:ident,)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
            match self.node {
                Node::Scalar(Value::String(s)) => match s.trim().parse() {
                    Ok(n) => visitor.$visit(n),
                    Err(_) => Err(de::Error::invalid_value(Unexpected::Str(s), &visitor)),
                },
                Node::Scalar(value) => value.$method(visitor),
                _ => self.deserialize_any(visitor),
            }
        }
    )*};
}

impl<'de> Deserializer<'de> for NodeDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.node {
            Node::Empty => visitor.visit_unit(),
            Node::Scalar(value) => value.deserialize_any(visitor),
            Node::Map(map) => Self::visit_map(map, visitor),
            Node::List(items) => Self::visit_seq(items, visitor),
        }
    }

    deserialize_parsed! {
        deserialize_i8 => visit_i8,
        deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32,
        deserialize_i64 => visit_i64,
        deserialize_i128 => visit_i128,
        deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16,
        deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64,
        deserialize_u128 => visit_u128,
        deserialize_f32 => visit_f32,
        deserialize_f64 => visit_f64,
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.node {
            Node::Empty => visitor.visit_bool(false),
            Node::Scalar(Value::String(s)) => match parse_flag(s) {
                Some(flag) => visitor.visit_bool(flag),
                None => Err(de::Error::invalid_value(Unexpected::Str(s), &visitor)),
            },
            Node::Scalar(value) => value.deserialize_bool(visitor),
            _ => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.node {
            Node::Empty | Node::Scalar(Value::Null) => visitor.visit_none(),
            Node::Scalar(Value::String(s)) if s.trim().is_empty() => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.node {
            Node::Empty => visitor.visit_unit(),
            Node::Scalar(value) => value.deserialize_unit(visitor),
            _ => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.node {
            Node::Empty => Self::visit_seq(&[], visitor),
            Node::List(items) => Self::visit_seq(items, visitor),
            Node::Scalar(Value::Array(_)) => self.deserialize_any(visitor),
            Node::Scalar(_) => Self::visit_seq(std::slice::from_ref(self.node), visitor),
            Node::Map(_) => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(self, _name: &'static str, _len: usize, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.node {
            Node::Map(map) => Self::visit_map(map, visitor),
            Node::Empty => visitor.visit_map(MapNodes { iter: None, value: None }),
            Node::Scalar(value) => value.deserialize_map(visitor),
            Node::List(_) => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.node {
            Node::Scalar(Value::String(s)) => visitor.visit_enum(BorrowedStrDeserializer::<Error>::new(s.trim())),
            Node::Scalar(value) => value.deserialize_enum(name, variants, visitor),
            Node::Map(map) => match map.first() {
                Some((variant, value)) if map.len() == 1 => visitor.visit_enum(TaggedVariant { variant: variant.as_str(), value }),
                _ => Err(de::Error::invalid_value(Unexpected::Map, &"a mapping with a single variant key")),
            },
            _ => Err(de::Error::invalid_type(self.unexpected(), &visitor)),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        char str string bytes byte_buf unit_struct identifier
    }
}

// ------------------------------- Access ----------------------------------- //

struct MapNodes<'de> {
    iter: Option<indexmap::map::Iter<'de, String, Node<Value>>>,
    value: Option<&'de Node<Value>>,
}

impl<'de> MapAccess<'de> for MapNodes<'de> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        match self.iter.as_mut().and_then(Iterator::next) {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(BorrowedStrDeserializer::<Error>::new(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<S: DeserializeSeed<'de>>(&mut self, seed: S) -> Result<S::Value, Error> {
        let value = self
            .value
            .take()
            .ok_or_else(|| de::Error::custom("map value requested before its key"))?;
        seed.deserialize(NodeDeserializer::new(value))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.as_ref().map_or(0, ExactSizeIterator::len))
    }
}

struct SeqNodes<'de> {
    iter: std::slice::Iter<'de, Node<Value>>,
}

impl<'de> SeqAccess<'de> for SeqNodes<'de> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Error> {
        self.iter
            .next()
            .map(|node| seed.deserialize(NodeDeserializer::new(node)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

/// `{"Variant": payload}`, the externally tagged enum layout.
struct TaggedVariant<'de> {
    variant: &'de str,
    value: &'de Node<Value>,
}

impl<'de> EnumAccess<'de> for TaggedVariant<'de> {
    type Error = Error;
    type Variant = NodeDeserializer<'de>;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, Self::Variant), Error> {
        let tag = seed.deserialize(BorrowedStrDeserializer::<Error>::new(self.variant))?;
        Ok((tag, NodeDeserializer::new(self.value)))
    }
}

impl<'de> VariantAccess<'de> for NodeDeserializer<'de> {
    type Error = Error;

    fn unit_variant(self) -> Result<(), Error> {
        de::Deserialize::deserialize(self)
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Error> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(self, _fields: &'static [&'static str], visitor: V) -> Result<V::Value, Error> {
        self.deserialize_map(visitor)
    }
}

// ------------------------------- Tests ------------------------------------ //
