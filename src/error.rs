use std::error::Error;
use std::fmt;

/// Errors produced by the query pipeline. Each variant maps to one stage;
/// a failure at any stage is terminal for that request and never retried.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// The storage engine could not be reached for schema introspection.
    SchemaUnavailable(String),
    /// No usable SQL could be produced from the natural-language question.
    TranslationFailed(String),
    /// The storage engine rejected or errored the generated SQL. Carries the
    /// underlying error text unmodified.
    QueryExecutionFailed(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SchemaUnavailable(msg) => {
                write!(f, "schema unavailable: {}", msg)
            }
            PipelineError::TranslationFailed(msg) => {
                write!(f, "translation failed: {}", msg)
            }
            PipelineError::QueryExecutionFailed(msg) => {
                write!(f, "query execution failed: {}", msg)
            }
        }
    }
}

impl Error for PipelineError {}
