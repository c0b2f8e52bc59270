use serde::Serialize;
use serde_json::Value;

use super::{JsonFacetKind, ResultBuilder, count_value, json_facets, require_object};
use crate::error::Result;
use crate::provider::Protocol;

/// Named facet-query counts, in received order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetQueryCounts(pub Vec<(String, i64)>);

impl FacetQueryCounts {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, c)| *c)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(n, c)| (n.as_str(), *c))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FacetQueryResultBuilder;

impl ResultBuilder for FacetQueryResultBuilder {
    type Data = FacetQueryCounts;

    fn execute(&self, response: &Value, protocol: Protocol) -> Result<FacetQueryCounts> {
        let counts = match protocol {
            Protocol::Classic => require_object(response, &["facet_counts", "facet_queries"])?
                .iter()
                .map(|(name, count)| Ok((name.clone(), count_value(count, name)?)))
                .collect::<Result<Vec<_>>>()?,
            Protocol::JsonApi => json_facets(response)?
                .into_iter()
                .filter(|(_, _, kind)| *kind == JsonFacetKind::Query)
                .map(|(name, block, _)| {
                    let count = block.get("count").unwrap_or(&Value::Null);
                    Ok((name.to_string(), count_value(count, name)?))
                })
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(FacetQueryCounts(counts))
    }
}
