use thiserror::Error;

/// Errors surfaced by the query cache.
///
/// The type is `Clone` so that a single failed execution can be delivered to
/// every caller that was waiting on the same identity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashError {
    #[error("Query definition not found: {query_id} ({reason})")]
    DefinitionNotFound { query_id: String, reason: String },

    #[error("Failed to parse query definition '{query_id}': {message}")]
    DefinitionParse { query_id: String, message: String },

    #[error("Parameter binding error for query '{query_id}': {message}")]
    ParameterBinding { query_id: String, message: String },

    #[error("Execution of {identity} failed: {message}")]
    Execution { identity: String, message: String },

    #[error("Execution of {identity} timed out after {timeout_ms}ms")]
    Timeout { identity: String, timeout_ms: u64 },

    #[error("Execution of {identity} was abandoned before completion")]
    Abandoned { identity: String },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DashError {
    pub fn binding(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        DashError::ParameterBinding {
            query_id: query_id.into(),
            message: message.into(),
        }
    }

    pub fn parse(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        DashError::DefinitionParse {
            query_id: query_id.into(),
            message: message.into(),
        }
    }

    pub fn not_found(query_id: impl Into<String>, reason: impl Into<String>) -> Self {
        DashError::DefinitionNotFound {
            query_id: query_id.into(),
            reason: reason.into(),
        }
    }

    /// True for failures raised while running a query, as opposed to failures
    /// resolving or binding it.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            DashError::Execution { .. } | DashError::Timeout { .. } | DashError::Abandoned { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DashError::Timeout {
            identity: "daily_sales".to_string(),
            timeout_ms: 1500,
        };
        assert_eq!(
            err.to_string(),
            "Execution of daily_sales timed out after 1500ms"
        );

        let err = DashError::binding("daily_sales", "missing parameter 'region'");
        assert!(err.to_string().contains("missing parameter 'region'"));
    }

    #[test]
    fn test_execution_failure_classification() {
        assert!(DashError::Abandoned {
            identity: "q".into()
        }
        .is_execution_failure());
        assert!(!DashError::not_found("q", "no such file").is_execution_failure());
    }
}
