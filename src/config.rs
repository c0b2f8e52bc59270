//! Client configuration.
//!
//! Layered as defaults, then an optional TOML file, then `SOLR_EXPRESS_*`
//! environment variables. The CLI applies its own flags on top.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ExpressError, Result};
use crate::provider::Protocol;
use crate::schema::{FieldInfo, SchemaBuilder, ValueKind};

pub const ENV_HOST: &str = "SOLR_EXPRESS_HOST";
pub const ENV_HANDLER: &str = "SOLR_EXPRESS_HANDLER";
pub const ENV_PROTOCOL: &str = "SOLR_EXPRESS_PROTOCOL";
pub const ENV_TIMEOUT_MS: &str = "SOLR_EXPRESS_TIMEOUT_MS";
pub const ENV_FAIL_FAST: &str = "SOLR_EXPRESS_FAIL_FAST";
pub const ENV_DUPLICATE_POLICY: &str = "SOLR_EXPRESS_DUPLICATE_POLICY";

/// What to do when a single-instance parameter is added twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateParameter`.
    #[default]
    Reject,
    /// Replace the earlier instance in place.
    Replace,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Replace => f.write_str("replace"),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = ExpressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "replace" => Ok(Self::Replace),
            other => Err(ExpressError::Config(format!(
                "unknown duplicate policy '{other}'"
            ))),
        }
    }
}

/// `[[fields]]` entry of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// Defaults to `name`.
    #[serde(default)]
    pub wire_name: Option<String>,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default = "default_true")]
    pub stored: bool,
    #[serde(default = "default_true")]
    pub indexed: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDecl {
    pub fn to_info(&self) -> FieldInfo {
        let wire = self.wire_name.clone().unwrap_or_else(|| self.name.clone());
        FieldInfo::new(self.name.clone(), wire, self.kind)
            .stored(self.stored)
            .indexed(self.indexed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL including the core/collection path.
    pub host: String,
    /// Request handler below `host`.
    pub handler: String,
    pub protocol: Protocol,
    pub timeout_ms: u64,
    /// Return validation failures from `Queryable::parameter` instead of logging them.
    pub fail_fast: bool,
    pub duplicate_policy: DuplicatePolicy,
    pub fields: Vec<FieldDecl>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8983/solr/techproducts".to_string(),
            handler: "query".to_string(),
            protocol: Protocol::Classic,
            timeout_ms: 30_000,
            fail_fast: false,
            duplicate_policy: DuplicatePolicy::Reject,
            fields: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExpressError::Config(format!("read {}: {e}", path.display())))?;
        let cfg: Self = toml::from_str(&text)
            .map_err(|e| ExpressError::Config(format!("parse {}: {e}", path.display())))?;
        debug!(path = %path.display(), fields = cfg.fields.len(), "config_loaded");
        Ok(cfg)
    }

    /// File (explicit path, else the default location when present) plus environment.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match explicit {
            Some(path) => Self::load(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::load(&path)?,
                _ => Self::default(),
            },
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Overlay `SOLR_EXPRESS_*` variables. Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        if let Ok(host) = dotenvy::var(ENV_HOST) {
            self.host = host;
        }

        if let Ok(handler) = dotenvy::var(ENV_HANDLER) {
            self.handler = handler;
        }

        if let Ok(val) = dotenvy::var(ENV_PROTOCOL) {
            match val.parse() {
                Ok(protocol) => self.protocol = protocol,
                Err(err) => warn!(var = ENV_PROTOCOL, %err, "ignoring env override"),
            }
        }

        if let Ok(val) = dotenvy::var(ENV_TIMEOUT_MS) {
            match val.parse::<u64>() {
                Ok(ms) => self.timeout_ms = ms,
                Err(err) => warn!(var = ENV_TIMEOUT_MS, %err, "ignoring env override"),
            }
        }

        if let Ok(val) = dotenvy::var(ENV_FAIL_FAST) {
            self.fail_fast = val.eq_ignore_ascii_case("true") || val == "1";
        }

        if let Ok(val) = dotenvy::var(ENV_DUPLICATE_POLICY) {
            match val.parse() {
                Ok(policy) => self.duplicate_policy = policy,
                Err(err) => warn!(var = ENV_DUPLICATE_POLICY, %err, "ignoring env override"),
            }
        }
    }

    /// Schema builder seeded with the declared `[[fields]]`.
    pub fn schema_builder(&self) -> SchemaBuilder {
        self.fields
            .iter()
            .fold(SchemaBuilder::default(), |builder, decl| builder.field(decl.to_info()))
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "solr-express", "solr-express")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                // SAFETY: tests touching the environment are serialized.
                unsafe { std::env::set_var(self.key, value) };
            } else {
                // SAFETY: tests touching the environment are serialized.
                unsafe { std::env::remove_var(self.key) };
            }
        }
    }

    fn set_env(key: &'static str, value: &str) -> EnvGuard {
        let previous = std::env::var(key).ok();
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::set_var(key, value) };
        EnvGuard { key, previous }
    }

    #[test]
    fn defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.handler, "query");
        assert_eq!(cfg.protocol, Protocol::Classic);
        assert_eq!(cfg.duplicate_policy, DuplicatePolicy::Reject);
        assert!(!cfg.fail_fast);
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        let _host = set_env(ENV_HOST, "http://search:8983/solr/products");
        let _protocol = set_env(ENV_PROTOCOL, "json-api");
        let _timeout = set_env(ENV_TIMEOUT_MS, "2500");
        let _fail = set_env(ENV_FAIL_FAST, "1");
        let _policy = set_env(ENV_DUPLICATE_POLICY, "replace");

        let cfg = ClientConfig::from_env();
        assert_eq!(cfg.host, "http://search:8983/solr/products");
        assert_eq!(cfg.protocol, Protocol::JsonApi);
        assert_eq!(cfg.timeout_ms, 2500);
        assert!(cfg.fail_fast);
        assert_eq!(cfg.duplicate_policy, DuplicatePolicy::Replace);
    }

    #[test]
    #[serial]
    fn bad_env_values_are_ignored() {
        let _timeout = set_env(ENV_TIMEOUT_MS, "soon");
        let _protocol = set_env(ENV_PROTOCOL, "solr9000");
        let cfg = ClientConfig::from_env();
        assert_eq!(cfg.timeout_ms, ClientConfig::default().timeout_ms);
        assert_eq!(cfg.protocol, Protocol::Classic);
    }

    #[test]
    #[serial]
    fn file_then_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
host = "http://file-host/solr/core"
protocol = "json-api"
fail_fast = true

[[fields]]
name = "price"
wire_name = "Price"
kind = "float"

[[fields]]
name = "features"
indexed = false
"#,
        )
        .unwrap();

        let _host = set_env(ENV_HOST, "http://env-host/solr/core");
        let cfg = ClientConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.host, "http://env-host/solr/core");
        assert_eq!(cfg.protocol, Protocol::JsonApi);
        assert!(cfg.fail_fast);
        assert_eq!(cfg.handler, "query");

        let schema = cfg.schema_builder().build().unwrap();
        let price = schema.field("price").unwrap();
        assert_eq!(price.wire_name(), "Price");
        assert_eq!(price.kind(), ValueKind::Float);
        let features = schema.field("features").unwrap();
        assert_eq!(features.wire_name(), "features");
        assert!(!features.is_indexed());
        assert!(features.is_stored());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "protocol = 5").unwrap();
        assert!(matches!(
            ClientConfig::load(&path),
            Err(ExpressError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::load(&dir.path().join("absent.toml")),
            Err(ExpressError::Config(_))
        ));
    }
}
