//! Result builders: typed views over one raw search response.
//!
//! - **[`document`]**: the projected document list.
//! - **[`facet_field`]**: term counts per faceted field.
//! - **[`facet_query`]**: one count per named facet query.
//! - **[`facet_range`]**: range buckets, with implicit bounds and before/after
//!   overflow buckets reconstructed from the compact wire encoding.
//! - **[`statistic`]**: total match count and server processing time.
//!
//! Every builder is a stateless transform of the parsed response, so one
//! response can be read by any number of builders.

pub mod document;
pub mod facet_field;
pub mod facet_query;
pub mod facet_range;
pub mod statistic;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ExpressError, Result};
use crate::provider::Protocol;

pub use document::DocumentBuilder;
pub use facet_field::FacetFieldResultBuilder;
pub use facet_query::{FacetQueryCounts, FacetQueryResultBuilder};
pub use facet_range::{DateGap, FacetRange, FacetRangeResultBuilder, RangeAxis, RangeFacet};
pub use statistic::{Statistic, StatisticResultBuilder};

pub trait ResultBuilder {
    type Data;

    fn execute(&self, response: &Value, protocol: Protocol) -> Result<Self::Data>;
}

/// One named facet with its buckets in received order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetKeyValue<K> {
    pub name: String,
    pub data: Vec<(K, i64)>,
}

impl<K: PartialEq> FacetKeyValue<K> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<i64> {
        self.data.iter().find(|(k, _)| k == key).map(|(_, c)| *c)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.data.iter().map(|(k, _)| k)
    }
}

/// Follow `keys` from `root`, failing with the dotted path when a step is absent.
pub(crate) fn require<'a>(root: &'a Value, keys: &[&str]) -> Result<&'a Value> {
    let mut current = root;
    for (depth, key) in keys.iter().enumerate() {
        current = current
            .get(key)
            .ok_or_else(|| ExpressError::shape(format!("missing '{}'", keys[..=depth].join("."))))?;
    }
    Ok(current)
}

pub(crate) fn require_object<'a>(root: &'a Value, keys: &[&str]) -> Result<&'a Map<String, Value>> {
    require(root, keys)?
        .as_object()
        .ok_or_else(|| ExpressError::shape(format!("'{}' is not an object", keys.join("."))))
}

/// Read a count that is either a bare integer or `{"count": n}`.
pub(crate) fn count_value(value: &Value, what: &str) -> Result<i64> {
    value
        .as_i64()
        .or_else(|| value.get("count").and_then(Value::as_i64))
        .ok_or_else(|| ExpressError::shape(format!("{what} is not a count: {value}")))
}

/// Optional overflow count; absent means zero.
pub(crate) fn optional_count(block: &Map<String, Value>, key: &str) -> Result<i64> {
    match block.get(key) {
        Some(value) => count_value(value, key),
        None => Ok(0),
    }
}

/// `(val, count)` pairs of a JSON facet API `buckets` array.
pub(crate) fn json_buckets<'a>(
    name: &str,
    block: &'a Map<String, Value>,
) -> Result<Vec<(&'a Value, i64)>> {
    let buckets = block
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| ExpressError::shape(format!("'facets.{name}.buckets' is not an array")))?;
    buckets
        .iter()
        .map(|bucket| {
            let val = bucket
                .get("val")
                .ok_or_else(|| ExpressError::shape(format!("bucket in '{name}' has no val")))?;
            let count = bucket
                .get("count")
                .ok_or_else(|| ExpressError::shape(format!("bucket in '{name}' has no count")))?;
            Ok((val, count_value(count, "bucket count")?))
        })
        .collect()
}

/// Term tokens come back as strings, numbers or booleans depending on field type.
pub(crate) fn token_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Facet block kinds in a JSON facet API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JsonFacetKind {
    Terms,
    Query,
    Range,
}

/// Named facet blocks under `facets`, classified by shape.
///
/// Range blocks are requested with `other=all`, so they always carry
/// `before`/`after`/`between`; terms blocks never do. Blocks without buckets are
/// facet queries. Scalars such as the top-level `count` are skipped.
pub(crate) fn json_facets<'a>(
    response: &'a Value,
) -> Result<Vec<(&'a str, &'a Map<String, Value>, JsonFacetKind)>> {
    let facets = require_object(response, &["facets"])?;
    Ok(facets
        .iter()
        .filter_map(|(name, block)| {
            let block = block.as_object()?;
            let kind = if block.contains_key("buckets") {
                if ["before", "after", "between"]
                    .iter()
                    .any(|k| block.contains_key(*k))
                {
                    JsonFacetKind::Range
                } else {
                    JsonFacetKind::Terms
                }
            } else if block.contains_key("count") {
                JsonFacetKind::Query
            } else {
                return None;
            };
            Some((name.as_str(), block, kind))
        })
        .collect())
}
