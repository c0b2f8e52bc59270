//! Query façade: collects parameters for one document type, executes once, and
//! hands the parsed response to any number of result builders.

use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ClientConfig, DuplicatePolicy};
use crate::error::{ExpressError, Result};
use crate::provider::{Protocol, Provider, RenderedRequest};
use crate::query::Parameter;
use crate::result::{DocumentBuilder, ResultBuilder, Statistic, StatisticResultBuilder};
use crate::schema::Document;

pub struct Queryable<D> {
    provider: Provider,
    duplicate_policy: DuplicatePolicy,
    fail_fast: bool,
    parameters: Vec<Parameter>,
    _marker: PhantomData<fn() -> D>,
}

impl<D> fmt::Debug for Queryable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryable")
            .field("host", &self.provider.host())
            .field("handler", &self.provider.handler())
            .field("protocol", &self.provider.protocol())
            .field("duplicate_policy", &self.duplicate_policy)
            .field("fail_fast", &self.fail_fast)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl<D: Document> Queryable<D> {
    pub fn new(provider: Provider, config: &ClientConfig) -> Self {
        Self {
            provider,
            duplicate_policy: config.duplicate_policy,
            fail_fast: config.fail_fast,
            parameters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a parameter.
    ///
    /// A second instance of a single-instance kind is rejected or replaces the
    /// first, per the configured [`DuplicatePolicy`]. Schema validation failures
    /// are returned under `fail_fast` and logged otherwise.
    pub fn parameter(&mut self, parameter: Parameter) -> Result<&mut Self> {
        let kind = parameter.kind();
        if let Err(err) = parameter.validate() {
            if self.fail_fast {
                return Err(err);
            }
            warn!(kind = kind.tag(), error = %err, "parameter_validation_failed");
        }

        if !parameter.allow_multiple_instances()
            && let Some(idx) = self.parameters.iter().position(|p| p.kind() == kind)
        {
            match self.duplicate_policy {
                DuplicatePolicy::Reject => return Err(ExpressError::DuplicateParameter(kind.tag())),
                DuplicatePolicy::Replace => {
                    debug!(kind = kind.tag(), "parameter_replaced");
                    self.parameters[idx] = parameter;
                    return Ok(self);
                }
            }
        }

        self.parameters.push(parameter);
        Ok(self)
    }

    /// Parameters in insertion order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn render(&self) -> RenderedRequest {
        self.provider.get_query(&self.parameters)
    }

    pub fn execute(&self) -> Result<QueryResult<D>> {
        let request = self.render();
        let raw = self.provider.execute(&request)?;
        QueryResult::from_raw(raw, self.provider.protocol())
    }
}

/// One executed response, parsed once.
#[derive(Debug, Clone)]
pub struct QueryResult<D> {
    raw: String,
    value: Value,
    protocol: Protocol,
    _marker: PhantomData<fn() -> D>,
}

impl<D> QueryResult<D> {
    /// Fails with `UnexpectedResponseShape` when `raw` is not JSON.
    pub fn from_raw(raw: String, protocol: Protocol) -> Result<Self> {
        let value = serde_json::from_str(&raw)
            .map_err(|e| ExpressError::shape(format!("response is not JSON: {e}")))?;
        Ok(Self {
            raw,
            value,
            protocol,
            _marker: PhantomData,
        })
    }

    pub fn get<B: ResultBuilder>(&self, builder: &B) -> Result<B::Data> {
        builder.execute(&self.value, self.protocol)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn statistics(&self) -> Result<Statistic> {
        self.get(&StatisticResultBuilder)
    }
}

impl<D: Document> QueryResult<D> {
    pub fn documents(&self) -> Result<Vec<D>> {
        self.get(&DocumentBuilder::<D>::new())
    }
}
