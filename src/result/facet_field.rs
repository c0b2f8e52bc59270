use serde_json::Value;

use super::{
    FacetKeyValue, JsonFacetKind, ResultBuilder, count_value, json_buckets, json_facets,
    require_object, token_to_string,
};
use crate::error::{ExpressError, Result};
use crate::provider::Protocol;

/// Term counts per faceted field, in the order the server returns them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacetFieldResultBuilder;

impl ResultBuilder for FacetFieldResultBuilder {
    type Data = Vec<FacetKeyValue<String>>;

    fn execute(&self, response: &Value, protocol: Protocol) -> Result<Self::Data> {
        match protocol {
            Protocol::Classic => {
                let fields = require_object(response, &["facet_counts", "facet_fields"])?;
                fields
                    .iter()
                    .map(|(name, counts)| classic_terms(name, counts))
                    .collect()
            }
            Protocol::JsonApi => json_facets(response)?
                .into_iter()
                .filter(|(_, _, kind)| *kind == JsonFacetKind::Terms)
                .map(|(name, block, _)| {
                    let mut facet = FacetKeyValue::new(name);
                    for (val, count) in json_buckets(name, block)? {
                        facet.data.push((token_to_string(val), count));
                    }
                    Ok(facet)
                })
                .collect(),
        }
    }
}

/// `[term, count, term, count, ...]`, or `{term: count}` when the server uses a map layout.
fn classic_terms(name: &str, counts: &Value) -> Result<FacetKeyValue<String>> {
    let mut facet = FacetKeyValue::new(name);
    match counts {
        Value::Array(flat) => {
            if flat.len() % 2 != 0 {
                return Err(ExpressError::shape(format!(
                    "facet field '{name}' has an odd number of entries"
                )));
            }
            for pair in flat.chunks_exact(2) {
                facet
                    .data
                    .push((token_to_string(&pair[0]), count_value(&pair[1], "term count")?));
            }
        }
        Value::Object(map) => {
            for (term, count) in map {
                facet.data.push((term.clone(), count_value(count, "term count")?));
            }
        }
        other => {
            return Err(ExpressError::shape(format!(
                "facet field '{name}' has unexpected value {other}"
            )));
        }
    }
    Ok(facet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classic_keeps_declaration_order() {
        let response = json!({
            "facet_counts": {
                "facet_queries": {},
                "facet_fields": {
                    "ManufacturerId": ["corsair", 3, "belkin", 2, "canon", 2],
                    "InStock": ["true", 17, "false", 4]
                }
            }
        });
        let facets = FacetFieldResultBuilder
            .execute(&response, Protocol::Classic)
            .unwrap();
        assert_eq!(facets.len(), 2);
        assert_eq!(facets[0].name, "ManufacturerId");
        assert_eq!(facets[1].name, "InStock");
        assert_eq!(
            facets[0].data,
            vec![
                ("corsair".to_string(), 3),
                ("belkin".to_string(), 2),
                ("canon".to_string(), 2)
            ]
        );
        assert_eq!(facets[1].get(&"false".to_string()), Some(4));
    }

    #[test]
    fn classic_map_layout_is_accepted() {
        let response = json!({
            "facet_counts": { "facet_fields": { "cat": { "electronics": 12, "memory": 3 } } }
        });
        let facets = FacetFieldResultBuilder
            .execute(&response, Protocol::Classic)
            .unwrap();
        assert_eq!(facets[0].keys().cloned().collect::<Vec<_>>(), vec!["electronics", "memory"]);
    }

    #[test]
    fn classic_odd_array_fails() {
        let response = json!({ "facet_counts": { "facet_fields": { "cat": ["a", 1, "b"] } } });
        assert!(matches!(
            FacetFieldResultBuilder.execute(&response, Protocol::Classic),
            Err(ExpressError::UnexpectedResponseShape(_))
        ));
    }

    #[test]
    fn json_reads_terms_buckets_only() {
        let response = json!({
            "facets": {
                "count": 32,
                "ManufacturerId": { "buckets": [ { "val": "corsair", "count": 3 } ] },
                "InStock": { "buckets": [ { "val": true, "count": 17 } ] },
                "cheap": { "count": 4 },
                "price": { "buckets": [ { "val": 0, "count": 1 } ], "before": { "count": 0 } }
            }
        });
        let facets = FacetFieldResultBuilder
            .execute(&response, Protocol::JsonApi)
            .unwrap();
        let names: Vec<_> = facets.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ManufacturerId", "InStock"]);
        assert_eq!(facets[1].data, vec![("true".to_string(), 17)]);
    }

    #[test]
    fn missing_section_fails() {
        let err = FacetFieldResultBuilder
            .execute(&json!({ "response": {} }), Protocol::Classic)
            .unwrap_err();
        assert!(err.to_string().contains("facet_counts"));
    }
}
