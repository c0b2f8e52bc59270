//! Query parameters and their per-protocol wire rendering.
//!
//! The set of parameters is closed, so each one is a variant of [`Parameter`]
//! and rendering is an explicit `match` per protocol generation:
//!
//! - **classic**: an ordered list of raw `key=value` entries, later encoded and
//!   joined by `&` by the provider.
//! - **JSON request API**: contributions merged into one JSON request body.

use serde_json::{Map, Value, json};

use super::value::ParameterValue;
use crate::error::{ExpressError, Result};
use crate::schema::FieldSelector;

/// Identity of a parameter variant. Its tag is the deterministic render-order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    FacetField,
    FacetQuery,
    FacetRange,
    FieldProjection,
    FilterQuery,
    Limit,
    Offset,
    Query,
    QueryField,
    Sort,
}

impl ParameterKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::FacetField => "facet_field",
            Self::FacetQuery => "facet_query",
            Self::FacetRange => "facet_range",
            Self::FieldProjection => "fields",
            Self::FilterQuery => "filter_query",
            Self::Limit => "limit",
            Self::Offset => "offset",
            Self::Query => "query",
            Self::QueryField => "query_field",
            Self::Sort => "sort",
        }
    }

    /// Whether one query may carry more than one instance of this kind.
    pub fn allow_multiple_instances(self) -> bool {
        !matches!(self, Self::Query | Self::Offset | Self::Limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Query(ParameterValue),
    FilterQuery {
        value: ParameterValue,
        tag: Option<String>,
    },
    FacetField {
        field: FieldSelector,
        limit: Option<u32>,
        excludes: Vec<String>,
    },
    FacetQuery {
        name: String,
        value: ParameterValue,
        excludes: Vec<String>,
    },
    FacetRange {
        name: String,
        field: FieldSelector,
        gap: String,
        start: String,
        end: String,
        excludes: Vec<String>,
    },
    FieldProjection(Vec<FieldSelector>),
    Offset(u64),
    Limit(u64),
    QueryField(String),
    Sort {
        field: FieldSelector,
        ascending: bool,
    },
}

fn required(what: &str, value: impl Into<String>) -> Result<String> {
    let value = value.into();
    if value.trim().is_empty() {
        Err(ExpressError::invalid(format!("{what} must not be blank")))
    } else {
        Ok(value)
    }
}

impl Parameter {
    pub fn query(value: ParameterValue) -> Self {
        Self::Query(value)
    }

    pub fn filter(value: ParameterValue) -> Self {
        Self::FilterQuery { value, tag: None }
    }

    /// Filter tagged for later exclusion by facets (`{!tag=name}`).
    pub fn filter_tagged(value: ParameterValue, tag: impl Into<String>) -> Result<Self> {
        Ok(Self::FilterQuery {
            value,
            tag: Some(required("filter tag", tag)?),
        })
    }

    pub fn facet_field(field: FieldSelector, limit: Option<u32>) -> Self {
        Self::FacetField {
            field,
            limit,
            excludes: Vec::new(),
        }
    }

    pub fn facet_query(name: impl Into<String>, value: ParameterValue) -> Result<Self> {
        Ok(Self::FacetQuery {
            name: required("facet query name", name)?,
            value,
            excludes: Vec::new(),
        })
    }

    pub fn facet_range(
        name: impl Into<String>,
        field: FieldSelector,
        gap: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::FacetRange {
            name: required("facet range name", name)?,
            field,
            gap: required("facet range gap", gap)?,
            start: required("facet range start", start)?,
            end: required("facet range end", end)?,
            excludes: Vec::new(),
        })
    }

    pub fn fields(fields: Vec<FieldSelector>) -> Result<Self> {
        if fields.is_empty() {
            return Err(ExpressError::invalid("field projection needs at least one field"));
        }
        Ok(Self::FieldProjection(fields))
    }

    pub fn offset(value: u64) -> Self {
        Self::Offset(value)
    }

    pub fn limit(value: u64) -> Self {
        Self::Limit(value)
    }

    pub fn query_field(value: impl Into<String>) -> Result<Self> {
        Ok(Self::QueryField(required("query field", value)?))
    }

    pub fn sort(field: FieldSelector, ascending: bool) -> Self {
        Self::Sort { field, ascending }
    }

    /// Exclude filters carrying these tags when counting this facet.
    /// Only facet parameters accept exclusions.
    pub fn excluding<I, S>(mut self, tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags
            .into_iter()
            .map(|t| required("excluded tag", t))
            .collect::<Result<Vec<_>>>()?;
        match &mut self {
            Self::FacetField { excludes, .. }
            | Self::FacetQuery { excludes, .. }
            | Self::FacetRange { excludes, .. } => excludes.extend(tags),
            other => {
                return Err(ExpressError::invalid(format!(
                    "'{}' parameters cannot exclude tags",
                    other.kind().tag()
                )));
            }
        }
        Ok(self)
    }

    pub fn kind(&self) -> ParameterKind {
        match self {
            Self::Query(_) => ParameterKind::Query,
            Self::FilterQuery { .. } => ParameterKind::FilterQuery,
            Self::FacetField { .. } => ParameterKind::FacetField,
            Self::FacetQuery { .. } => ParameterKind::FacetQuery,
            Self::FacetRange { .. } => ParameterKind::FacetRange,
            Self::FieldProjection(_) => ParameterKind::FieldProjection,
            Self::Offset(_) => ParameterKind::Offset,
            Self::Limit(_) => ParameterKind::Limit,
            Self::QueryField(_) => ParameterKind::QueryField,
            Self::Sort { .. } => ParameterKind::Sort,
        }
    }

    pub fn allow_multiple_instances(&self) -> bool {
        self.kind().allow_multiple_instances()
    }

    /// Check the referenced fields against their schema attributes.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::FieldProjection(fields) => {
                for field in fields {
                    if !field.is_stored() {
                        return Err(ExpressError::InvalidParameter(format!(
                            "field '{}' is not stored and cannot be projected",
                            field.name()
                        )));
                    }
                }
                Ok(())
            }
            Self::Query(value) | Self::FilterQuery { value, .. } => {
                match value.selector() {
                    Some(field) => must_be_indexed(field, "queried"),
                    None => Ok(()),
                }
            }
            Self::FacetQuery { value, .. } => match value.selector() {
                Some(field) => must_be_indexed(field, "faceted"),
                None => Ok(()),
            },
            Self::FacetField { field, .. } | Self::FacetRange { field, .. } => {
                must_be_indexed(field, "faceted")
            }
            Self::Sort { field, .. } => must_be_indexed(field, "sorted"),
            Self::Offset(_) | Self::Limit(_) | Self::QueryField(_) => Ok(()),
        }
    }

    /// Append this parameter's raw `key=value` entries.
    pub fn render_classic(&self, container: &mut Vec<String>) {
        match self {
            Self::Query(value) => container.push(format!("q={}", value.execute())),
            Self::FilterQuery { value, tag } => container.push(format!(
                "fq={}{}",
                tag_prefix(tag.as_deref()),
                value.execute()
            )),
            Self::FacetField {
                field,
                limit,
                excludes,
            } => {
                enable_facets(container);
                container.push(format!(
                    "facet.field={}{}",
                    exclude_prefix(excludes),
                    field.wire_name()
                ));
                if let Some(limit) = limit {
                    container.push(format!("f.{}.facet.limit={limit}", field.wire_name()));
                }
            }
            Self::FacetQuery {
                name,
                value,
                excludes,
            } => {
                enable_facets(container);
                container.push(format!(
                    "facet.query={}{}",
                    key_prefix(name, excludes),
                    value.execute()
                ));
            }
            Self::FacetRange {
                name,
                field,
                gap,
                start,
                end,
                excludes,
            } => {
                enable_facets(container);
                let mut local = format!("key={name}");
                if !excludes.is_empty() {
                    local.push_str(&format!(" ex={}", excludes.join(",")));
                }
                container.push(format!(
                    "facet.range={{!{local} facet.range.gap={gap} facet.range.start={start} \
                     facet.range.end={end} facet.range.other=all}}{}",
                    field.wire_name()
                ));
            }
            Self::FieldProjection(fields) => {
                let names = join_wire_names(fields);
                merge_entry(container, "fl=", &names, ",");
            }
            Self::Offset(value) => container.push(format!("start={value}")),
            Self::Limit(value) => container.push(format!("rows={value}")),
            Self::QueryField(value) => container.push(format!("qf={value}")),
            Self::Sort { field, ascending } => {
                merge_entry(container, "sort=", &sort_clause(field, *ascending), ",");
            }
        }
    }

    /// Merge this parameter's contribution into a JSON request body.
    pub fn render_json(&self, body: &mut Map<String, Value>) {
        match self {
            Self::Query(value) => {
                body.insert("query".into(), Value::String(value.execute()));
            }
            Self::FilterQuery { value, tag } => {
                let filter = format!("{}{}", tag_prefix(tag.as_deref()), value.execute());
                push_array(body, "filter", Value::String(filter));
            }
            Self::FacetField {
                field,
                limit,
                excludes,
            } => {
                let mut block = Map::new();
                block.insert("type".into(), json!("terms"));
                block.insert("field".into(), json!(field.wire_name()));
                if let Some(limit) = limit {
                    block.insert("limit".into(), json!(limit));
                }
                insert_domain(&mut block, excludes);
                insert_facet(body, field.wire_name().to_string(), block);
            }
            Self::FacetQuery {
                name,
                value,
                excludes,
            } => {
                let mut block = Map::new();
                block.insert("type".into(), json!("query"));
                block.insert("q".into(), json!(value.execute()));
                insert_domain(&mut block, excludes);
                insert_facet(body, name.clone(), block);
            }
            Self::FacetRange {
                name,
                field,
                gap,
                start,
                end,
                excludes,
            } => {
                let mut block = Map::new();
                block.insert("type".into(), json!("range"));
                block.insert("field".into(), json!(field.wire_name()));
                block.insert("gap".into(), json!(gap));
                block.insert("start".into(), json!(start));
                block.insert("end".into(), json!(end));
                block.insert("other".into(), json!("all"));
                insert_domain(&mut block, excludes);
                insert_facet(body, name.clone(), block);
            }
            Self::FieldProjection(fields) => {
                for field in fields {
                    push_array(body, "fields", json!(field.wire_name()));
                }
            }
            Self::Offset(value) => {
                body.insert("offset".into(), json!(value));
            }
            Self::Limit(value) => {
                body.insert("limit".into(), json!(value));
            }
            Self::QueryField(value) => {
                let params = body
                    .entry("params")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(params) = params {
                    params.insert("qf".into(), json!(value));
                }
            }
            Self::Sort { field, ascending } => {
                let clause = sort_clause(field, *ascending);
                let merged = match body.get("sort").and_then(Value::as_str) {
                    Some(existing) => format!("{existing}, {clause}"),
                    None => clause,
                };
                body.insert("sort".into(), Value::String(merged));
            }
        }
    }
}

fn must_be_indexed(field: &FieldSelector, action: &str) -> Result<()> {
    if field.is_indexed() {
        Ok(())
    } else {
        Err(ExpressError::InvalidParameter(format!(
            "field '{}' is not indexed and cannot be {action}",
            field.name()
        )))
    }
}

fn tag_prefix(tag: Option<&str>) -> String {
    tag.map(|t| format!("{{!tag={t}}}")).unwrap_or_default()
}

fn exclude_prefix(excludes: &[String]) -> String {
    if excludes.is_empty() {
        String::new()
    } else {
        format!("{{!ex={}}}", excludes.join(","))
    }
}

fn key_prefix(name: &str, excludes: &[String]) -> String {
    if excludes.is_empty() {
        format!("{{!key={name}}}")
    } else {
        format!("{{!key={name} ex={}}}", excludes.join(","))
    }
}

fn enable_facets(container: &mut Vec<String>) {
    if !container.iter().any(|entry| entry == "facet=true") {
        container.push("facet=true".to_string());
    }
}

fn join_wire_names(fields: &[FieldSelector]) -> String {
    fields
        .iter()
        .map(FieldSelector::wire_name)
        .collect::<Vec<_>>()
        .join(",")
}

fn sort_clause(field: &FieldSelector, ascending: bool) -> String {
    format!(
        "{} {}",
        field.wire_name(),
        if ascending { "asc" } else { "desc" }
    )
}

/// Extend an existing `prefix...` entry, or push a new one.
fn merge_entry(container: &mut Vec<String>, prefix: &str, value: &str, separator: &str) {
    match container.iter_mut().find(|entry| entry.starts_with(prefix)) {
        Some(entry) => {
            entry.push_str(separator);
            entry.push_str(value);
        }
        None => container.push(format!("{prefix}{value}")),
    }
}

fn push_array(body: &mut Map<String, Value>, key: &str, item: Value) {
    let slot = body
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(items) = slot {
        items.push(item);
    }
}

/// Add `block` under `facet.<key>`, replacing a `facet` entry that is not an object.
fn insert_facet(body: &mut Map<String, Value>, key: String, block: Map<String, Value>) {
    match body.get_mut("facet") {
        Some(Value::Object(facets)) => {
            facets.insert(key, Value::Object(block));
        }
        _ => {
            let mut facets = Map::new();
            facets.insert(key, Value::Object(block));
            body.insert("facet".into(), Value::Object(facets));
        }
    }
}

fn insert_domain(block: &mut Map<String, Value>, excludes: &[String]) {
    if !excludes.is_empty() {
        block.insert(
            "domain".into(),
            json!({ "excludeTags": excludes.join(",") }),
        );
    }
}
