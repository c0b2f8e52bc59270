//! Resolved document schema.
//!
//! A [`Schema`] is a lookup table built once (usually behind a `Lazy`) that maps
//! the caller-facing field name to the index's wire name plus its stored/indexed
//! attributes. Query values never carry raw field names: they carry a
//! [`FieldSelector`] obtained from the schema, so an undeclared field fails at
//! construction time instead of producing a silently wrong wire request.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ExpressError, Result};

/// Scalar kind of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Location,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Location => "location",
        };
        f.write_str(s)
    }
}

/// Declared metadata of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Name used by the caller (and by the `Document` record).
    pub name: String,
    /// Name used on the wire.
    pub wire_name: String,
    pub stored: bool,
    pub indexed: bool,
    pub kind: ValueKind,
}

impl FieldInfo {
    /// A stored and indexed field.
    pub fn new(name: impl Into<String>, wire_name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            wire_name: wire_name.into(),
            stored: true,
            indexed: true,
            kind,
        }
    }

    pub fn stored(mut self, stored: bool) -> Self {
        self.stored = stored;
        self
    }

    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }
}

/// Handle to a field that has been resolved against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    info: FieldInfo,
}

impl FieldSelector {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn wire_name(&self) -> &str {
        &self.info.wire_name
    }

    pub fn is_stored(&self) -> bool {
        self.info.stored
    }

    pub fn is_indexed(&self) -> bool {
        self.info.indexed
    }

    pub fn kind(&self) -> ValueKind {
        self.info.kind
    }

    pub fn info(&self) -> &FieldInfo {
        &self.info
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.info.wire_name)
    }
}

/// Field lookup table for one document type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldInfo>,
    by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up the declared metadata of `name`.
    pub fn resolve(&self, name: &str) -> Result<&FieldInfo> {
        self.by_name
            .get(name)
            .map(|&idx| &self.fields[idx])
            .ok_or_else(|| ExpressError::UnknownField(name.to_string()))
    }

    /// Resolve `name` into a selector usable by parameter values.
    pub fn field(&self, name: &str) -> Result<FieldSelector> {
        self.resolve(name).map(|info| FieldSelector { info: info.clone() })
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldInfo>,
}

impl SchemaBuilder {
    pub fn field(mut self, info: FieldInfo) -> Self {
        self.fields.push(info);
        self
    }

    /// Shorthand for a stored, indexed field.
    pub fn simple(self, name: &str, wire_name: &str, kind: ValueKind) -> Self {
        self.field(FieldInfo::new(name, wire_name, kind))
    }

    /// Fails on blank names and on a name declared twice.
    pub fn build(self) -> Result<Schema> {
        let mut by_name = HashMap::with_capacity(self.fields.len());
        for (idx, info) in self.fields.iter().enumerate() {
            if info.name.trim().is_empty() || info.wire_name.trim().is_empty() {
                return Err(ExpressError::invalid("schema field names must not be blank"));
            }
            if by_name.insert(info.name.clone(), idx).is_some() {
                return Err(ExpressError::invalid(format!(
                    "field '{}' declared twice",
                    info.name
                )));
            }
        }
        Ok(Schema {
            fields: self.fields,
            by_name,
        })
    }
}

/// A record type that can be projected out of a response document list.
///
/// Field values are looked up under each declared wire name and handed to serde
/// under the schema name, so `#[serde(default)]` covers fields the server omits.
pub trait Document: DeserializeOwned {
    fn schema() -> &'static Schema;

    fn field(name: &str) -> Result<FieldSelector> {
        Self::schema().field(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tech_schema() -> Schema {
        Schema::builder()
            .simple("id", "Id", ValueKind::Text)
            .simple("in_stock", "InStock", ValueKind::Boolean)
            .field(FieldInfo::new("notes", "Notes", ValueKind::Text).stored(false))
            .field(FieldInfo::new("raw", "Raw", ValueKind::Text).indexed(false))
            .build()
            .unwrap()
    }

    #[test]
    fn resolves_declared_fields() {
        let schema = tech_schema();
        let info = schema.resolve("in_stock").unwrap();
        assert_eq!(info.wire_name, "InStock");
        assert!(info.stored && info.indexed);
        assert_eq!(info.kind, ValueKind::Boolean);

        let notes = schema.field("notes").unwrap();
        assert!(!notes.is_stored());
        assert!(notes.is_indexed());
        assert_eq!(notes.to_string(), "Notes");
    }

    #[test]
    fn unknown_field_is_an_error() {
        let schema = tech_schema();
        let err = schema.field("price").unwrap_err();
        assert!(matches!(err, ExpressError::UnknownField(name) if name == "price"));
    }

    #[test]
    fn fields_keep_declaration_order() {
        let schema = tech_schema();
        let names: Vec<_> = schema.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "in_stock", "notes", "raw"]);
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn duplicate_and_blank_declarations_fail() {
        let dup = Schema::builder()
            .simple("id", "Id", ValueKind::Text)
            .simple("id", "Other", ValueKind::Text)
            .build();
        assert!(matches!(dup, Err(ExpressError::InvalidArgument(_))));

        let blank = Schema::builder().simple(" ", "Id", ValueKind::Text).build();
        assert!(matches!(blank, Err(ExpressError::InvalidArgument(_))));
    }
}
