pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod storage;

pub use error::{PipelineError, Result};

pub mod config {
    use anyhow::Context;

    pub const DEFAULT_DATA_API_BASE_URL: &str = "https://api.unleashnfts.com/api";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_api_base_url: Option<String>,
        pub data_api_key: Option<String>,
        pub cohere_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                data_api_base_url: std::env::var("DATA_API_BASE_URL").ok(),
                data_api_key: std::env::var("BITSCRUNCH_API_KEY").ok(),
                cohere_api_key: std::env::var("COHERE_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn data_api_base_url(&self) -> &str {
            self.data_api_base_url
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_DATA_API_BASE_URL)
        }

        pub fn require_data_api_key(&self) -> anyhow::Result<&str> {
            self.data_api_key
                .as_deref()
                .context("BITSCRUNCH_API_KEY is required")
        }

        pub fn require_cohere_api_key(&self) -> anyhow::Result<&str> {
            self.cohere_api_key
                .as_deref()
                .context("COHERE_API_KEY is required")
        }
    }
}
