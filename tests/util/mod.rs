use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde::Deserialize;
use solr_express::transport::{Method, Transport, TransportError, TransportResponse};
use solr_express::{ClientConfig, Document, FieldInfo, Provider, Queryable, Schema, ValueKind};

pub const HOST: &str = "http://localhost:8983/solr/techproducts";

/// One request as seen by [`StaticTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

/// Answers every request with the same status and body, recording what was sent.
#[derive(Clone)]
pub struct StaticTransport {
    status: u16,
    body: String,
    sent: Arc<Mutex<Vec<SentRequest>>>,
}

#[allow(dead_code)]
impl StaticTransport {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for StaticTransport {
    fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> Result<TransportResponse, TransportError> {
        self.sent.lock().unwrap().push(SentRequest {
            method,
            url: url.to_string(),
            body: body.map(str::to_string),
        });
        Ok(TransportResponse {
            status: self.status,
            body: self.body.clone(),
        })
    }
}

/// Record shaped like the Solr `techproducts` example core.
#[allow(dead_code)]
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TechProduct {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub price: f64,
    pub popularity: i64,
    pub in_stock: bool,
}

static TECH_PRODUCT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::builder()
        .simple("id", "Id", ValueKind::Text)
        .simple("name", "Name", ValueKind::Text)
        .simple("manufacturer", "ManufacturerId", ValueKind::Text)
        .simple("price", "Price", ValueKind::Float)
        .simple("popularity", "Popularity", ValueKind::Integer)
        .simple("in_stock", "InStock", ValueKind::Boolean)
        .simple("released", "Released", ValueKind::Date)
        .simple("store", "Store", ValueKind::Location)
        .field(FieldInfo::new("features", "Features", ValueKind::Text).stored(false))
        .build()
        .expect("valid techproducts schema")
});

impl Document for TechProduct {
    fn schema() -> &'static Schema {
        &TECH_PRODUCT_SCHEMA
    }
}

#[allow(dead_code)]
pub fn queryable(config: &ClientConfig, transport: &StaticTransport) -> Queryable<TechProduct> {
    let provider = Provider::new(HOST, &config.handler, config.protocol, transport.clone());
    Queryable::new(provider, config)
}

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
