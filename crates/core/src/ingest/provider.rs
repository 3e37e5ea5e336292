use crate::config::Settings;
use crate::domain::document::Document;
use crate::error::{PipelineError, Result};
use crate::ingest::types::{self, DataQuery, Page};
use crate::storage::DocumentStore;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Issue the query and return the response body parsed as JSON, verbatim.
    async fn fetch(&self, query: &DataQuery) -> Result<Value>;

    /// Fetch, then append the parsed body to `store`. Nothing is recorded on failure.
    async fn fetch_and_record(&self, query: &DataQuery, store: &DocumentStore) -> Result<Value> {
        let value = self.fetch(query).await?;
        store.append(Document::new(value.clone())).await;
        tracing::info!(
            provider = self.provider_name(),
            endpoint = %query.endpoint(),
            "recorded upstream response as generation context"
        );
        Ok(value)
    }

    async fn fetch_pool_metadata(&self, blockchain: &str, pair_address: &str) -> Result<Value> {
        self.fetch(&DataQuery::PoolMetadata {
            blockchain: blockchain.to_string(),
            pair_address: pair_address.to_string(),
        })
        .await
    }

    async fn fetch_pool_metrics(&self, blockchain: &str, pair_address: &str) -> Result<Value> {
        self.fetch(&DataQuery::PoolMetrics {
            blockchain: blockchain.to_string(),
            pair_address: pair_address.to_string(),
        })
        .await
    }

    #[deprecated(note = "pair addresses are not unique across chains; use fetch_pool_metrics")]
    async fn fetch_pool_metrics_any_chain(&self, pair_address: &str) -> Result<Value> {
        self.fetch(&DataQuery::PoolMetricsAnyChain {
            pair_address: pair_address.to_string(),
        })
        .await
    }

    async fn fetch_pools_by_protocol(&self, protocol: &str, page: Page) -> Result<Value> {
        self.fetch(&DataQuery::PoolsByProtocol {
            protocol: protocol.to_string(),
            page,
        })
        .await
    }

    async fn fetch_protocol_metadata(
        &self,
        blockchain: &str,
        protocol: &str,
        page: Page,
    ) -> Result<Value> {
        self.fetch(&DataQuery::ProtocolMetadata {
            blockchain: blockchain.to_string(),
            protocol: protocol.to_string(),
            page,
        })
        .await
    }

    async fn fetch_supported_protocols(&self, blockchain: &str) -> Result<Value> {
        self.fetch(&DataQuery::SupportedProtocols {
            blockchain: blockchain.to_string(),
        })
        .await
    }
}

/// Client for the UnleashNFTs (bitsCrunch) DeFi endpoints.
#[derive(Debug, Clone)]
pub struct UnleashClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl UnleashClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_data_api_key()?.to_string();
        let timeout_secs = std::env::var("DATA_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(
            settings.data_api_base_url(),
            api_key,
            Duration::from_secs(timeout_secs),
        )
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build data API http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    fn url(&self, query: &DataQuery) -> String {
        format!(
            "{}/{}/defi/{}",
            self.base_url.trim_end_matches('/'),
            query.version().as_str(),
            query.path()
        )
    }

    fn headers(&self, endpoint: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| PipelineError::upstream(endpoint, format!("invalid API key header: {e}")))?;
        headers.insert("x-api-key", api_key);
        Ok(headers)
    }

    fn map_request_error(&self, endpoint: &str, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::UpstreamTimeout {
                endpoint: endpoint.to_string(),
                timeout: self.timeout,
            }
        } else {
            PipelineError::upstream(endpoint, format!("request failed: {err}"))
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for UnleashClient {
    fn provider_name(&self) -> &'static str {
        "unleash_defi"
    }

    async fn fetch(&self, query: &DataQuery) -> Result<Value> {
        let endpoint = query.endpoint();
        if let Some(blockchain) = query.blockchain() {
            if !types::is_known_blockchain(blockchain) {
                tracing::debug!(%endpoint, blockchain, "blockchain not in known list; forwarding as-is");
            }
        }

        let res = self
            .http
            .get(self.url(query))
            .headers(self.headers(&endpoint)?)
            .query(&query.query_pairs())
            .send()
            .await
            .map_err(|e| self.map_request_error(&endpoint, e))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| self.map_request_error(&endpoint, e))?;

        if !status.is_success() {
            tracing::warn!(%endpoint, %status, "data API returned non-success status");
            return Err(PipelineError::upstream(
                &endpoint,
                format!("HTTP {status}: {text}"),
            ));
        }

        serde_json::from_str::<Value>(&text).map_err(|e| {
            PipelineError::upstream(&endpoint, format!("response is not valid JSON ({e}): {text}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> UnleashClient {
        UnleashClient::new(uri, "test-key", Duration::from_millis(500)).unwrap()
    }

    #[tokio::test]
    async fn fetch_pool_metadata_hits_v2_with_key_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/defi/pool/metadata"))
            .and(query_param("blockchain", "ethereum"))
            .and(query_param("pair_address", "0xabc"))
            .and(header("x-api-key", "test-key"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"pair": "0xabc"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let value = client(&server.uri())
            .fetch_pool_metadata("ethereum", "0xabc")
            .await
            .unwrap();
        assert_eq!(value, json!({"data": [{"pair": "0xabc"}]}));
    }

    #[tokio::test]
    async fn fetch_and_record_appends_in_call_order() {
        let server = MockServer::start().await;
        for i in 0..3 {
            Mock::given(method("GET"))
                .and(path("/v1/defi/pool/metrics"))
                .and(query_param("pair_address", format!("0x{i}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "liquidity": i })))
                .mount(&server)
                .await;
        }

        let client = client(&server.uri());
        let store = DocumentStore::new();
        for i in 0..3 {
            let query = DataQuery::PoolMetrics {
                blockchain: "ethereum".to_string(),
                pair_address: format!("0x{i}"),
            };
            client.fetch_and_record(&query, &store).await.unwrap();
        }

        let snapshot = store.snapshot().await;
        let values: Vec<_> = snapshot.into_iter().map(Document::into_value).collect();
        assert_eq!(
            values,
            vec![json!({"liquidity": 0}), json!({"liquidity": 1}), json!({"liquidity": 2})]
        );
    }

    #[tokio::test]
    async fn non_json_body_is_upstream_error_and_not_recorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/defi/pool/supported_protocols"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let store = DocumentStore::new();
        let query = DataQuery::SupportedProtocols {
            blockchain: "polygon".to_string(),
        };
        let err = client(&server.uri())
            .fetch_and_record(&query, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamFetch { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/defi/pool"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad key"})))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .fetch_pools_by_protocol("uniswap", Page::default())
            .await
            .unwrap_err();
        match err {
            PipelineError::UpstreamFetch { endpoint, detail } => {
                assert_eq!(endpoint, "v1/defi/pool");
                assert!(detail.contains("401"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_upstream_surfaces_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/defi/pool"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .fetch_protocol_metadata("ethereum", "aave", Page::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamTimeout { .. }), "{err:?}");
    }

    #[tokio::test]
    #[allow(deprecated)]
    async fn unscoped_pool_metrics_omits_blockchain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/defi/pool/metrics"))
            .and(query_param("pair_address", "0xdef"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"volume": 1})))
            .mount(&server)
            .await;

        let value = client(&server.uri())
            .fetch_pool_metrics_any_chain("0xdef")
            .await
            .unwrap();
        assert_eq!(value, json!({"volume": 1}));
        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].url.query().unwrap_or_default().contains("blockchain"));
    }
}
