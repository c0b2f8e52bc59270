//! Blocking HTTP transport used by the provider.
//!
//! The provider only needs `send(method, url, body) -> (status, body)`. Retries,
//! pooling and TLS belong to the implementation behind the trait.

use std::fmt;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fault below the HTTP status level (connect, timeout, body read).
#[derive(Error, Debug)]
#[error("{0}")]
pub struct TransportError(pub String);

pub trait Transport: Send + Sync {
    fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` blocking client with a fixed request timeout.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("solr-express/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError(format!("building http client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        debug!(%method, url, has_body = body.is_some(), "http_send");
        let request = match method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json")),
        };
        let request = match body {
            Some(body) => request.body(body.to_string()),
            None => request,
        };
        let response = request
            .send()
            .map_err(|e| TransportError(format!("sending {method} {url}: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TransportError(format!("reading response body: {e}")))?;
        Ok(TransportResponse { status, body })
    }
}
