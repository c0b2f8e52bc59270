use std::marker::PhantomData;

use serde_json::{Map, Value};

use super::{ResultBuilder, require};
use crate::error::{ExpressError, Result};
use crate::provider::Protocol;
use crate::schema::Document;

/// Projects `response.docs` into `D`, renaming wire names to schema names.
pub struct DocumentBuilder<D> {
    _marker: PhantomData<fn() -> D>,
}

impl<D> DocumentBuilder<D> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<D> Default for DocumentBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> ResultBuilder for DocumentBuilder<D> {
    type Data = Vec<D>;

    fn execute(&self, response: &Value, _protocol: Protocol) -> Result<Vec<D>> {
        let docs = require(response, &["response", "docs"])?
            .as_array()
            .ok_or_else(|| ExpressError::shape("'response.docs' is not an array"))?;
        let schema = D::schema();

        docs.iter()
            .enumerate()
            .map(|(idx, doc)| {
                let doc = doc.as_object().ok_or_else(|| {
                    ExpressError::shape(format!("document {idx} is not an object"))
                })?;
                let mut projected = Map::new();
                for info in schema.fields() {
                    if let Some(value) = doc.get(&info.wire_name) {
                        projected.insert(info.name.clone(), value.clone());
                    }
                }
                serde_json::from_value(Value::Object(projected)).map_err(|e| {
                    ExpressError::shape(format!("document {idx} does not match schema: {e}"))
                })
            })
            .collect()
    }
}
