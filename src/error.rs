//! Error taxonomy shared by every layer of the query pipeline.

use thiserror::Error;

/// Errors raised while building, sending or parsing a query.
#[derive(Error, Debug)]
pub enum ExpressError {
    /// A required constructor input was blank or missing.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The field name is not declared in the document schema.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A parameter failed schema validation (e.g. projecting a non-stored field).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A second instance of a single-instance parameter was added.
    #[error("parameter '{0}' does not allow multiple instances")]
    DuplicateParameter(&'static str),

    /// A JSON path required by a result builder is absent or malformed.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponseShape(String),

    /// Non-success status or transport fault. The response body is kept for diagnostics.
    #[error("query execution failed: {message}")]
    QueryExecution {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ExpressError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Raw body returned by the server, when a query execution failed after a response.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::QueryExecution { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExpressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_execution_exposes_body() {
        let err = ExpressError::QueryExecution {
            status: Some(400),
            message: "server returned 400".into(),
            body: Some(r#"{"error":{"msg":"undefined field"}}"#.into()),
        };
        assert!(err.to_string().contains("server returned 400"));
        assert_eq!(
            err.response_body(),
            Some(r#"{"error":{"msg":"undefined field"}}"#)
        );
        assert_eq!(ExpressError::shape("x").response_body(), None);
    }

    #[test]
    fn duplicate_parameter_names_the_kind() {
        let err = ExpressError::DuplicateParameter("query");
        assert_eq!(
            err.to_string(),
            "parameter 'query' does not allow multiple instances"
        );
    }
}
