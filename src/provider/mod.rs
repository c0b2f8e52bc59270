//! Query assembler: orders parameters, renders them for one protocol generation
//! and executes the rendered request against the transport.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ExpressError, Result};
use crate::query::Parameter;
use crate::transport::{HttpTransport, Method, Transport};

/// Response options appended to every request.
pub const RESPONSE_OPTIONS: &str = "echoParams=none&wt=json&indent=off";

/// Protocol generation spoken by the search service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Query-string parameters on a GET request (Solr 4.x).
    #[default]
    Classic,
    /// JSON request body with the JSON facet API (Solr 5+).
    JsonApi,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic => write!(f, "classic"),
            Self::JsonApi => write!(f, "json-api"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ExpressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "solr4" | "query-string" => Ok(Self::Classic),
            "json-api" | "json" | "solr5" => Ok(Self::JsonApi),
            other => Err(ExpressError::Config(format!("unknown protocol '{other}'"))),
        }
    }
}

/// A request ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedRequest {
    /// `query` is already encoded and joined by `&`.
    Classic { handler: String, query: String },
    Json { handler: String, body: Value },
}

impl fmt::Display for RenderedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classic { handler, query } => write!(f, "{handler}?{query}"),
            Self::Json { handler, body } => write!(f, "{handler} {body}"),
        }
    }
}

pub struct Provider {
    host: String,
    handler: String,
    protocol: Protocol,
    transport: Box<dyn Transport>,
}

impl Provider {
    pub fn new(
        host: impl Into<String>,
        handler: impl Into<String>,
        protocol: Protocol,
        transport: impl Transport + 'static,
    ) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            handler: handler.into().trim_matches('/').to_string(),
            protocol,
            transport: Box::new(transport),
        }
    }

    /// Provider backed by [`HttpTransport`] with the configured timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_millis(config.timeout_ms))
            .map_err(|e| ExpressError::Config(e.to_string()))?;
        Ok(Self::new(
            config.host.clone(),
            config.handler.clone(),
            config.protocol,
            transport,
        ))
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Render `parameters` in canonical order.
    ///
    /// Parameters are stable-sorted by kind tag, so the output does not depend on
    /// the order kinds were added in; instances of the same kind keep their
    /// relative order.
    pub fn get_query(&self, parameters: &[Parameter]) -> RenderedRequest {
        let mut ordered: Vec<&Parameter> = parameters.iter().collect();
        ordered.sort_by_key(|p| p.kind().tag());
        debug!(protocol = %self.protocol, params = ordered.len(), "query_render");

        match self.protocol {
            Protocol::Classic => {
                let mut container = Vec::new();
                for parameter in ordered {
                    parameter.render_classic(&mut container);
                }
                let query = container
                    .iter()
                    .map(|entry| encode_entry(entry))
                    .collect::<Vec<_>>()
                    .join("&");
                RenderedRequest::Classic {
                    handler: self.handler.clone(),
                    query,
                }
            }
            Protocol::JsonApi => {
                let mut body = Map::new();
                for parameter in ordered {
                    parameter.render_json(&mut body);
                }
                RenderedRequest::Json {
                    handler: self.handler.clone(),
                    body: Value::Object(body),
                }
            }
        }
    }

    /// Send one blocking request and return the raw response text.
    pub fn execute(&self, request: &RenderedRequest) -> Result<String> {
        let (method, url, body) = match request {
            RenderedRequest::Classic { handler, query } => {
                let url = if query.is_empty() {
                    format!("{}/{handler}?{RESPONSE_OPTIONS}", self.host)
                } else {
                    format!("{}/{handler}?{query}&{RESPONSE_OPTIONS}", self.host)
                };
                (Method::Get, url, None)
            }
            RenderedRequest::Json { handler, body } => (
                Method::Post,
                format!("{}/{handler}?{RESPONSE_OPTIONS}", self.host),
                Some(body.to_string()),
            ),
        };

        let started = Instant::now();
        let response = self
            .transport
            .send(method, &url, body.as_deref())
            .map_err(|e| {
                warn!(%method, url = %url, error = %e, "query_transport_failed");
                ExpressError::QueryExecution {
                    status: None,
                    message: e.to_string(),
                    body: None,
                }
            })?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            protocol = %self.protocol,
            status = response.status,
            elapsed_ms,
            bytes = response.body.len(),
            "query_execute"
        );

        if !response.is_success() {
            return Err(ExpressError::QueryExecution {
                status: Some(response.status),
                message: format!("server returned {}", response.status),
                body: Some(response.body),
            });
        }
        Ok(response.body)
    }
}

/// Percent-encode the value half of a `key=value` entry.
///
/// Query syntax characters (`:`, `*`, brackets, local-param braces) stay readable;
/// separators that would break the query string are escaped.
fn encode_entry(entry: &str) -> String {
    match entry.split_once('=') {
        Some((key, value)) => format!("{key}={}", encode_value(value)),
        None => encode_value(entry),
    }
}

fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut buf = [0u8; 4];
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || ":*[]{}!=,.-_~^()/@$;|'".contains(c) {
            out.push(c);
        } else {
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ParameterValue;
    use crate::schema::{Schema, ValueKind};
    use crate::transport::{TransportError, TransportResponse};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Recorded = Arc<Mutex<Vec<(Method, String, Option<String>)>>>;

    struct CannedTransport {
        status: u16,
        body: &'static str,
        calls: Recorded,
    }

    impl Transport for CannedTransport {
        fn send(
            &self,
            method: Method,
            url: &str,
            body: Option<&str>,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.map(str::to_string)));
            Ok(TransportResponse {
                status: self.status,
                body: self.body.to_string(),
            })
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(
            &self,
            _method: Method,
            _url: &str,
            _body: Option<&str>,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Err(TransportError("connection refused".into()))
        }
    }

    fn schema() -> Schema {
        Schema::builder()
            .simple("in_stock", "InStock", ValueKind::Boolean)
            .simple("manufacturer", "ManufacturerId", ValueKind::Text)
            .simple("price", "Price", ValueKind::Float)
            .build()
            .unwrap()
    }

    fn provider(protocol: Protocol, status: u16) -> (Provider, Recorded) {
        let calls: Recorded = Arc::default();
        let transport = CannedTransport {
            status,
            body: r#"{"responseHeader":{"QTime":1}}"#,
            calls: calls.clone(),
        };
        (
            Provider::new("http://localhost:8983/solr/techproducts/", "query", protocol, transport),
            calls,
        )
    }

    fn sample_parameters() -> Vec<Parameter> {
        let s = schema();
        vec![
            Parameter::filter(ParameterValue::single(s.field("in_stock").unwrap(), true).unwrap()),
            Parameter::query(ParameterValue::all()),
            Parameter::filter(
                ParameterValue::single(s.field("manufacturer").unwrap(), "corsair").unwrap(),
            ),
        ]
    }

    #[test]
    fn classic_order_is_independent_of_insertion_order() {
        let (provider, _) = provider(Protocol::Classic, 200);
        let params = sample_parameters();
        let query_last = vec![params[0].clone(), params[2].clone(), params[1].clone()];
        let query_first = vec![params[1].clone(), params[0].clone(), params[2].clone()];

        let rendered = provider.get_query(&params).to_string();
        assert_eq!(rendered, "query?fq=InStock:true&fq=ManufacturerId:corsair&q=*:*");
        assert_eq!(rendered.matches("fq=").count(), 2);
        assert_eq!(provider.get_query(&query_last).to_string(), rendered);
        assert_eq!(provider.get_query(&query_first).to_string(), rendered);
    }

    #[test]
    fn classic_values_are_escaped() {
        let (provider, _) = provider(Protocol::Classic, 200);
        let s = schema();
        let params = vec![Parameter::filter(
            ParameterValue::range_from(s.field("price").unwrap(), 10).unwrap(),
        )];
        insta::assert_snapshot!(provider.get_query(&params).to_string(), @"query?fq=Price:[10%20TO%20*]");
        assert_eq!(encode_value("a&b#c+d"), "a%26b%23c%2Bd");
    }

    #[test]
    fn json_body_collects_filters() {
        let (provider, _) = provider(Protocol::JsonApi, 200);
        let rendered = provider.get_query(&sample_parameters());
        match rendered {
            RenderedRequest::Json { handler, body } => {
                assert_eq!(handler, "query");
                assert_eq!(
                    body,
                    json!({
                        "filter": ["InStock:true", "ManufacturerId:corsair"],
                        "query": "*:*"
                    })
                );
            }
            other => panic!("expected json request, got {other:?}"),
        }
    }

    #[test]
    fn execute_appends_response_options() {
        let (provider, calls) = provider(Protocol::Classic, 200);
        let request = provider.get_query(&[Parameter::query(ParameterValue::all())]);
        let body = provider.execute(&request).unwrap();
        assert!(body.contains("QTime"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::Get);
        assert_eq!(
            calls[0].1,
            "http://localhost:8983/solr/techproducts/query?q=*:*&echoParams=none&wt=json&indent=off"
        );
        assert!(calls[0].2.is_none());
    }

    #[test]
    fn json_execute_posts_body() {
        let (provider, calls) = provider(Protocol::JsonApi, 200);
        let request = provider.get_query(&[Parameter::limit(5)]);
        provider.execute(&request).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, Method::Post);
        assert!(calls[0].1.ends_with("/query?echoParams=none&wt=json&indent=off"));
        assert_eq!(calls[0].2.as_deref(), Some(r#"{"limit":5}"#));
    }

    #[test]
    fn non_success_status_keeps_body() {
        let (provider, _) = provider(Protocol::Classic, 500);
        let request = provider.get_query(&[]);
        let err = provider.execute(&request).unwrap_err();
        match err {
            ExpressError::QueryExecution { status, body, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(body.as_deref(), Some(r#"{"responseHeader":{"QTime":1}}"#));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn transport_fault_is_query_execution_error() {
        let provider = Provider::new("http://x", "select", Protocol::Classic, FailingTransport);
        let err = provider.execute(&provider.get_query(&[])).unwrap_err();
        assert!(matches!(
            err,
            ExpressError::QueryExecution { status: None, .. }
        ));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn protocol_parses_aliases() {
        assert_eq!("solr4".parse::<Protocol>().unwrap(), Protocol::Classic);
        assert_eq!("JSON".parse::<Protocol>().unwrap(), Protocol::JsonApi);
        assert!("soap".parse::<Protocol>().is_err());
    }
}
