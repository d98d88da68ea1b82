//! Field inventory of a deserializable model.
//!
//! serde offers no reflection, so the inventory is recovered by driving
//! `T::deserialize` with placeholder deserializers: one run records the
//! declared field names, one records which `deserialize_*` method each field
//! asks for, and one run per field leaves that field out to see whether `T`
//! reports it missing.
//!
//! Only the top level is inspected. A type that is not a plain struct has no
//! fields.
use std::cell::Cell;

use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeOwned, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use serde::forward_to_deserialize_any;

type Error = serde_json::Error;

/// How a field reads its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `bool`: a checkbox, absent means `false`.
    Flag,
    /// A sequence, bound from every value submitted under its name.
    Many,
    /// `Option<_>`.
    Optional,
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// `T` cannot be built when this field is absent.
    pub required: bool,
}

impl FieldSpec {
    pub fn is_multiple(&self) -> bool {
        self.kind == FieldKind::Many
    }
}

/// Declared top-level fields of `T`, in declaration order.
pub fn inspect<T: DeserializeOwned>() -> Vec<FieldSpec> {
    let names = Cell::new(&[][..]);
    let _ = T::deserialize(Skeleton { names: Some(&names), omit: None, kinds: None });
    let names: &'static [&'static str] = names.get();
    if names.is_empty() {
        return Vec::new();
    }

    let kinds: Vec<Cell<Option<FieldKind>>> = names.iter().map(|_| Cell::new(None)).collect();
    let _ = T::deserialize(Skeleton { names: None, omit: None, kinds: Some(kinds.as_slice()) });

    names
        .iter()
        .zip(&kinds)
        .enumerate()
        .map(|(index, (&name, kind))| {
            let kind = kind.get().unwrap_or(FieldKind::Single);
            let required = match T::deserialize(Skeleton { names: None, omit: Some(index), kinds: None }) {
                Ok(_) => false,
                Err(err) => err.to_string() == format!("missing field `{name}`") || kind != FieldKind::Optional,
            };
            FieldSpec { name, kind, required }
        })
        .collect()
}

// ------------------------------- Skeleton --------------------------------- //

/// Top-level stand-in: presents a struct's declared fields with blank values.
struct Skeleton<'a> {
    names: Option<&'a Cell<&'static [&'static str]>>,
    omit: Option<usize>,
    kinds: Option<&'a [Cell<Option<FieldKind>>]>,
}

impl<'de> Deserializer<'de> for Skeleton<'_> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Error> {
        Err(de::Error::custom("not a struct"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        if let Some(names) = self.names {
            names.set(fields);
        }
        visitor.visit_map(BlankFields { fields, next: 0, omit: self.omit, kinds: self.kinds, value: None })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

// ------------------------------- Blank ------------------------------------ //

/// Produces the emptiest value the visitor accepts, recording what it was asked for.
#[derive(Clone, Copy)]
struct Blank<'a> {
    kind: Option<&'a Cell<Option<FieldKind>>>,
}

impl Blank<'static> {
    const SILENT: Self = Blank { kind: None };
}

impl Blank<'_> {
    fn record(&self, kind: FieldKind) {
        if let Some(cell) = self.kind {
            if cell.get().is_none() {
                cell.set(Some(kind));
            }
        }
    }
}

macro_rules! blank_number {
    ($($method:ident => $visit:ident($zero:expr),)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
            self.record(FieldKind::Single);
            visitor.$visit($zero)
        }
    )*};
}

impl<'de> Deserializer<'de> for Blank<'_> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_unit()
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Flag);
        visitor.visit_bool(false)
    }

    blank_number! {
        deserialize_i8 => visit_i64(0),
        deserialize_i16 => visit_i64(0),
        deserialize_i32 => visit_i64(0),
        deserialize_i64 => visit_i64(0),
        deserialize_i128 => visit_i128(0),
        deserialize_u8 => visit_u64(0),
        deserialize_u16 => visit_u64(0),
        deserialize_u32 => visit_u64(0),
        deserialize_u64 => visit_u64(0),
        deserialize_u128 => visit_u128(0),
        deserialize_f32 => visit_f64(0.0),
        deserialize_f64 => visit_f64(0.0),
        deserialize_char => visit_char(' '),
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_str("")
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_bytes(&[])
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Optional);
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Many);
        visitor.visit_seq(Blanks { remaining: 0 })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_seq(Blanks { remaining: len })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(self, _name: &'static str, len: usize, visitor: V) -> Result<V::Value, Error> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_map(BlankFields { fields: &[], next: 0, omit: None, kinds: None, value: None })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        visitor.visit_map(BlankFields { fields, next: 0, omit: None, kinds: None, value: None })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        self.record(FieldKind::Single);
        let variant = variants.first().ok_or_else(|| de::Error::custom("enum without variants"))?;
        visitor.visit_enum(BlankVariant { variant })
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_unit()
    }
}

// ------------------------------- Access ----------------------------------- //

struct BlankFields<'a> {
    fields: &'static [&'static str],
    next: usize,
    omit: Option<usize>,
    kinds: Option<&'a [Cell<Option<FieldKind>>]>,
    value: Option<usize>,
}

impl<'de> MapAccess<'de> for BlankFields<'_> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        if self.omit == Some(self.next) {
            self.next += 1;
        }
        let Some(&name) = self.fields.get(self.next) else {
            return Ok(None);
        };
        self.value = Some(self.next);
        self.next += 1;
        seed.deserialize(BorrowedStrDeserializer::<Error>::new(name)).map(Some)
    }

    fn next_value_seed<S: DeserializeSeed<'de>>(&mut self, seed: S) -> Result<S::Value, Error> {
        let index = self
            .value
            .take()
            .ok_or_else(|| de::Error::custom("map value requested before its key"))?;
        let kind = self.kinds.and_then(|kinds| kinds.get(index));
        seed.deserialize(Blank { kind })
    }
}

struct Blanks {
    remaining: usize,
}

impl<'de> SeqAccess<'de> for Blanks {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(Blank::SILENT).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct BlankVariant {
    variant: &'static str,
}

impl<'de> EnumAccess<'de> for BlankVariant {
    type Error = Error;
    type Variant = Blank<'static>;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, Self::Variant), Error> {
        let tag = seed.deserialize(BorrowedStrDeserializer::<Error>::new(self.variant))?;
        Ok((tag, Blank::SILENT))
    }
}

impl<'de> VariantAccess<'de> for Blank<'_> {
    type Error = Error;

    fn unit_variant(self) -> Result<(), Error> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Error> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_seq(Blanks { remaining: len })
    }

    fn struct_variant<V: Visitor<'de>>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(BlankFields { fields, next: 0, omit: None, kinds: None, value: None })
    }
}

// ------------------------------- Tests ------------------------------------ //
