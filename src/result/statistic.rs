use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::{ResultBuilder, require};
use crate::error::{ExpressError, Result};
use crate::provider::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistic {
    pub document_count: i64,
    pub is_empty: bool,
    pub elapsed_time: Duration,
}

/// Reads `response.numFound` and `responseHeader.QTime`; both are required.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticResultBuilder;

impl ResultBuilder for StatisticResultBuilder {
    type Data = Statistic;

    fn execute(&self, response: &Value, _protocol: Protocol) -> Result<Statistic> {
        let document_count = require(response, &["response", "numFound"])?
            .as_i64()
            .ok_or_else(|| ExpressError::shape("'response.numFound' is not an integer"))?;
        let qtime = require(response, &["responseHeader", "QTime"])?
            .as_u64()
            .ok_or_else(|| ExpressError::shape("'responseHeader.QTime' is not a duration"))?;

        Ok(Statistic {
            document_count,
            is_empty: document_count == 0,
            elapsed_time: Duration::from_millis(qtime),
        })
    }
}
