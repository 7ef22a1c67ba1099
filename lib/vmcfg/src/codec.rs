// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Table-driven encoding of configuration documents.
//!
//! Every sub-document lists its persisted fields in a static [`Field`]
//! table: the external key, whether the key must be present, and a pair of
//! functions moving the value between the in-memory struct and a TOML
//! [`Value`]. [`encode`] and [`decode`] walk that table, so the on-disk key
//! set of a document is exactly what its table says and nothing else.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

pub use toml::{Table, Value};

/// Errors which may be returned when decoding a document.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{document}: missing required field {key:?}")]
    MissingField { document: &'static str, key: &'static str },

    #[error("{document}: field {key:?} should be {expected}, found {found}")]
    TypeMismatch {
        document: &'static str,
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{document}: invalid value for field {key:?}: {reason}")]
    InvalidValue { document: &'static str, key: &'static str, reason: String },

    #[error("{document}: in field {key:?}")]
    Nested {
        document: &'static str,
        key: &'static str,
        #[source]
        source: Box<DecodeError>,
    },

    #[error("{document}: in field {key:?}, entry {index}")]
    NestedEntry {
        document: &'static str,
        key: &'static str,
        index: usize,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    /// The error raised by the most deeply nested document.
    pub fn innermost(&self) -> &DecodeError {
        match self {
            Self::Nested { source, .. } | Self::NestedEntry { source, .. } => {
                source.innermost()
            }
            other => other,
        }
    }
}

/// A failure converting a single field value, before the document and key
/// it belongs to are known.
#[derive(Debug)]
pub enum FieldError {
    Mismatch { expected: &'static str, found: &'static str },
    Invalid(String),
    Nested(DecodeError),
    NestedEntry(usize, DecodeError),
}

impl FieldError {
    fn at(self, document: &'static str, key: &'static str) -> DecodeError {
        match self {
            Self::Mismatch { expected, found } => {
                DecodeError::TypeMismatch { document, key, expected, found }
            }
            Self::Invalid(reason) => {
                DecodeError::InvalidValue { document, key, reason }
            }
            Self::Nested(source) => {
                DecodeError::Nested { document, key, source: Box::new(source) }
            }
            Self::NestedEntry(index, source) => DecodeError::NestedEntry {
                document,
                key,
                index,
                source: Box::new(source),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
}

pub enum Encoder<D> {
    /// Always written.
    Always(fn(&D) -> Value),
    /// Written only when the function yields a value.
    IfPresent(fn(&D) -> Option<Value>),
}

pub type Decoder<D> = fn(&mut D, Value) -> Result<(), FieldError>;

/// One persisted field of a document.
pub struct Field<D> {
    pub key: &'static str,
    pub presence: Presence,
    pub encode: Encoder<D>,
    pub decode: Decoder<D>,
}

impl<D> Field<D> {
    pub const fn required(
        key: &'static str,
        encode: fn(&D) -> Value,
        decode: Decoder<D>,
    ) -> Self {
        Self {
            key,
            presence: Presence::Required,
            encode: Encoder::Always(encode),
            decode,
        }
    }

    pub const fn optional(
        key: &'static str,
        encode: fn(&D) -> Option<Value>,
        decode: Decoder<D>,
    ) -> Self {
        Self {
            key,
            presence: Presence::Optional,
            encode: Encoder::IfPresent(encode),
            decode,
        }
    }
}

/// A configuration document with a fixed external key mapping.
pub trait Document: Default + Sized + 'static {
    /// Name used in error messages.
    const NAME: &'static str;

    const FIELDS: &'static [Field<Self>];

    /// Receives the location of the VM bundle after a successful decode.
    /// The location is never persisted.
    fn attach_base_path(&mut self, _base: &Path) {}
}

pub fn encode<D: Document>(doc: &D) -> Table {
    let mut table = Table::new();
    for field in D::FIELDS {
        let value = match field.encode {
            Encoder::Always(f) => Some(f(doc)),
            Encoder::IfPresent(f) => f(doc),
        };
        if let Some(value) = value {
            table.insert(field.key.to_owned(), value);
        }
    }
    table
}

/// Decodes a document from `table`, handing it `base` afterwards.
///
/// Keys not named in the document's field table are ignored. Absent
/// optional keys leave the field at its [`Default`] value.
pub fn decode<D: Document>(
    mut table: Table,
    base: Option<&Path>,
) -> Result<D, DecodeError> {
    let mut doc = D::default();
    for field in D::FIELDS {
        match table.remove(field.key) {
            Some(value) => {
                (field.decode)(&mut doc, value)
                    .map_err(|e| e.at(D::NAME, field.key))?;
            }
            None if field.presence == Presence::Required => {
                return Err(DecodeError::MissingField {
                    document: D::NAME,
                    key: field.key,
                });
            }
            None => {}
        }
    }
    if let Some(base) = base {
        doc.attach_base_path(base);
    }
    Ok(doc)
}

/// Parses a single document from TOML text.
pub fn from_toml_str<D: Document>(
    raw: &str,
    base: Option<&Path>,
) -> Result<D, crate::ConfigError> {
    let table = toml::from_str::<Table>(raw)?;
    Ok(decode(table, base)?)
}

pub fn to_toml_string<D: Document>(
    doc: &D,
) -> Result<String, crate::ConfigError> {
    Ok(toml::to_string(&encode(doc))?)
}

// Value conversions used by the field tables.

fn mismatch(expected: &'static str, found: &Value) -> FieldError {
    FieldError::Mismatch { expected, found: found.type_str() }
}

pub fn boolean(value: Value) -> Result<bool, FieldError> {
    match value {
        Value::Boolean(b) => Ok(b),
        other => Err(mismatch("boolean", &other)),
    }
}

pub fn string(value: Value) -> Result<String, FieldError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(mismatch("string", &other)),
    }
}

pub fn integer(value: Value) -> Result<i64, FieldError> {
    match value {
        Value::Integer(i) => Ok(i),
        other => Err(mismatch("integer", &other)),
    }
}

/// An integer that must fit in `T`.
pub fn bounded<T: TryFrom<i64>>(value: Value) -> Result<T, FieldError> {
    let raw = integer(value)?;
    T::try_from(raw).map_err(|_| {
        FieldError::Invalid(format!(
            "{raw} is out of range for {}",
            std::any::type_name::<T>()
        ))
    })
}

/// A string parsed through [`FromStr`].
pub fn parsed<T>(value: Value) -> Result<T, FieldError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = string(value)?;
    raw.parse::<T>()
        .map_err(|e| FieldError::Invalid(format!("{raw:?}: {e}")))
}

pub fn list<T>(
    value: Value,
    item: impl Fn(Value) -> Result<T, FieldError>,
) -> Result<Vec<T>, FieldError> {
    match value {
        Value::Array(items) => items.into_iter().map(item).collect(),
        other => Err(mismatch("array", &other)),
    }
}

pub fn document<D: Document>(value: Value) -> Result<D, FieldError> {
    match value {
        Value::Table(table) => decode(table, None).map_err(FieldError::Nested),
        other => Err(mismatch("table", &other)),
    }
}

pub fn documents<D: Document>(value: Value) -> Result<Vec<D>, FieldError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Table(table) => decode(table, None)
                    .map_err(|e| FieldError::NestedEntry(index, e)),
                other => Err(mismatch("array of tables", &other)),
            })
            .collect(),
        other => Err(mismatch("array", &other)),
    }
}

/// Encodes anything with a canonical string form.
pub fn text<T: Display>(item: &T) -> Value {
    Value::String(item.to_string())
}

pub fn text_opt<T: Display>(item: &Option<T>) -> Option<Value> {
    item.as_ref().map(text)
}

pub fn texts<T: Display>(items: &[T]) -> Value {
    Value::Array(items.iter().map(text).collect())
}

pub fn table<D: Document>(doc: &D) -> Value {
    Value::Table(encode(doc))
}

pub fn tables<D: Document>(docs: &[D]) -> Value {
    Value::Array(docs.iter().map(table).collect())
}
