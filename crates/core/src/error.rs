use crate::llm::error::LlmDiagnosticsError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream fetch failed ({endpoint}): {detail}")]
    UpstreamFetch { endpoint: String, detail: String },

    #[error("upstream request timed out ({endpoint}) after {timeout:?}")]
    UpstreamTimeout { endpoint: String, timeout: Duration },

    #[error(transparent)]
    Generation(#[from] LlmDiagnosticsError),

    #[error("LLM request timed out (provider={provider}) after {timeout:?}")]
    GenerationTimeout {
        provider: &'static str,
        timeout: Duration,
    },

    #[error("LLM output does not match the recommendation schema: {detail}")]
    SchemaNonconformance { detail: String, raw_output: String },
}

impl PipelineError {
    /// Stable label used in API error bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UpstreamFetch { .. } => "upstream_fetch",
            PipelineError::UpstreamTimeout { .. } => "upstream_timeout",
            PipelineError::Generation(_) => "generation",
            PipelineError::GenerationTimeout { .. } => "generation_timeout",
            PipelineError::SchemaNonconformance { .. } => "schema_nonconformance",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamTimeout { .. } | PipelineError::GenerationTimeout { .. }
        )
    }

    pub(crate) fn upstream(endpoint: &str, detail: impl Into<String>) -> Self {
        PipelineError::UpstreamFetch {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }
}
