//! Retrieval-augmented generation of protocol recommendations.
//!
//! [`GenerationPipeline::generate_direct`] and [`GenerationPipeline::generate_grounded`]
//! return the model's text untouched; callers must parse and validate it themselves.
//! [`GenerationPipeline::recommend`] does that validation, with a single repair turn.

use crate::domain::document::Document;
use crate::domain::recommendation::Recommendation;
use crate::error::{PipelineError, Result};
use crate::llm::{json, prompt, ChatBackend, ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
use crate::storage::DocumentStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Prompt only.
    Direct,
    /// Prompt plus the accumulated market-data documents.
    Grounded,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Direct => "direct",
            GenerationMode::Grounded => "grounded",
        }
    }

    fn system_instruction(self) -> String {
        match self {
            GenerationMode::Direct => prompt::direct_system_instruction(),
            GenerationMode::Grounded => prompt::grounded_system_instruction(),
        }
    }
}

#[derive(Clone)]
pub struct GenerationPipeline {
    backend: Arc<dyn ChatBackend>,
}

impl GenerationPipeline {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }

    pub async fn generate_direct(&self, prompt: &str) -> Result<String> {
        let res = self
            .complete(GenerationMode::Direct, prompt, Vec::new())
            .await?;
        Ok(res.text)
    }

    /// Generates against the store's contents at call time. An empty store still
    /// produces a request, with an empty document list.
    pub async fn generate_grounded(&self, prompt: &str, store: &DocumentStore) -> Result<String> {
        let documents = store.snapshot().await;
        let res = self
            .complete(GenerationMode::Grounded, prompt, documents)
            .await?;
        Ok(res.text)
    }

    /// Generates and validates a [`Recommendation`]; grounded when `context` is given.
    pub async fn recommend(
        &self,
        prompt: &str,
        context: Option<&DocumentStore>,
    ) -> Result<Recommendation> {
        let (mode, documents) = match context {
            Some(store) => (GenerationMode::Grounded, store.snapshot().await),
            None => (GenerationMode::Direct, Vec::new()),
        };

        let first = self.complete(mode, prompt, documents.clone()).await?;
        let err = match json::parse_recommendation(&first.text) {
            Ok(recommendation) => return Ok(recommendation),
            Err(err) => err,
        };

        tracing::warn!(
            mode = mode.as_str(),
            error = %err,
            "LLM output failed recommendation validation; attempting one repair"
        );

        let repair = ChatRequest {
            messages: vec![
                ChatMessage::system(mode.system_instruction()),
                ChatMessage::user(prompt),
                ChatMessage::assistant(first.text.clone()),
                ChatMessage::user(crate::llm::prompt::repair_prompt(
                    &first.text,
                    &format!("{err:#}"),
                )),
            ],
            documents,
            response_format: ResponseFormat::JsonObject,
        };
        let second = self.backend.chat(&repair).await?;

        json::parse_recommendation(&second.text).map_err(|err| {
            tracing::error!(
                mode = mode.as_str(),
                error = %err,
                "LLM output still invalid after repair"
            );
            PipelineError::SchemaNonconformance {
                detail: format!("{err:#}"),
                raw_output: second.text,
            }
        })
    }

    async fn complete(
        &self,
        mode: GenerationMode,
        prompt: &str,
        documents: Vec<Document>,
    ) -> Result<ChatResponse> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(mode.system_instruction()),
                ChatMessage::user(prompt),
            ],
            documents,
            response_format: ResponseFormat::JsonObject,
        };

        tracing::info!(
            provider = self.backend.provider_name(),
            mode = mode.as_str(),
            documents = request.documents.len(),
            prompt_len = prompt.len(),
            "requesting recommendation"
        );

        self.backend.chat(&request).await.map_err(|err| {
            tracing::warn!(
                provider = self.backend.provider_name(),
                mode = mode.as_str(),
                kind = err.kind(),
                error = %err,
                "generation failed"
            );
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DataQuery, MarketDataProvider, UnleashClient};
    use crate::llm::error::LlmDiagnosticsError;
    use crate::llm::Role;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Replays queued replies and records every request it receives.
    #[derive(Default)]
    struct RecordingBackend {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl RecordingBackend {
        fn replying(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for RecordingBackend {
        fn provider_name(&self) -> &'static str {
            "recording"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("no reply queued");
            reply.map(|text| ChatResponse {
                text,
                raw_response_json: json!({}),
            })
        }
    }

    fn generation_failure() -> PipelineError {
        LlmDiagnosticsError {
            provider: "recording",
            stage: "http",
            detail: "status=500".to_string(),
            raw_output: None,
            raw_response_json: None,
        }
        .into()
    }

    fn schema_json() -> String {
        json!({
            "protocol_name": "Uniswap V3",
            "protocol_description": "Concentrated liquidity AMM",
            "protocol_steps": [
                {"step_number": 1, "description": "Swap ETH to USDC", "estimated_time": "1 min", "potential_fees": "0.05%"}
            ],
            "protocol_link": "https://app.uniswap.org",
            "estimated_slippage": "0.1%",
            "overall_benefit": "Best route by liquidity",
            "risks": ["price impact"],
            "alternative_protocols": ["Curve"]
        })
        .to_string()
    }

    #[tokio::test]
    async fn direct_mode_passes_text_through_unchanged() {
        // Deliberately odd spacing: the pipeline must not re-serialize.
        let raw = format!("  {}\n", schema_json());
        let backend = RecordingBackend::replying(vec![Ok(raw.clone())]);
        let pipeline = GenerationPipeline::new(backend.clone());

        let out = pipeline.generate_direct("swap 1 ETH").await.unwrap();
        assert_eq!(out, raw);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert!(req.documents.is_empty());
        assert_eq!(req.response_format, ResponseFormat::JsonObject);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1], ChatMessage::user("swap 1 ETH"));
    }

    #[tokio::test]
    async fn grounded_mode_forwards_exact_snapshot() {
        let store = DocumentStore::new();
        store.append(Document::new(json!({"pool": "a"}))).await;
        store.append(Document::from("note")).await;

        let backend = RecordingBackend::replying(vec![Ok(schema_json())]);
        let pipeline = GenerationPipeline::new(backend.clone());
        pipeline.generate_grounded("route", &store).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].documents, store.snapshot().await);
        assert!(requests[0].messages[0].content.contains("total slippage"));
    }

    #[tokio::test]
    async fn grounded_mode_with_empty_store_still_submits() {
        let backend = RecordingBackend::replying(vec![Ok(schema_json())]);
        let pipeline = GenerationPipeline::new(backend.clone());

        let out = pipeline
            .generate_grounded("route", &DocumentStore::new())
            .await
            .unwrap();
        assert_eq!(out, schema_json());

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].documents.is_empty());
    }

    #[tokio::test]
    async fn both_modes_surface_llm_failure_as_error() {
        let backend = RecordingBackend::replying(vec![
            Err(generation_failure()),
            Err(generation_failure()),
        ]);
        let pipeline = GenerationPipeline::new(backend);

        let direct = pipeline.generate_direct("p").await;
        assert!(matches!(direct, Err(PipelineError::Generation(_))));

        let grounded = pipeline.generate_grounded("p", &DocumentStore::new()).await;
        assert!(matches!(grounded, Err(PipelineError::Generation(_))));
    }

    #[tokio::test]
    async fn recommend_repairs_once_then_succeeds() {
        let backend = RecordingBackend::replying(vec![
            Ok("Sure! Here is your plan: use Uniswap.".to_string()),
            Ok(format!("```json\n{}\n```", schema_json())),
        ]);
        let pipeline = GenerationPipeline::new(backend.clone());

        let rec = pipeline.recommend("swap", None).await.unwrap();
        assert_eq!(rec.protocol_name, "Uniswap V3");

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        let repair = &requests[1];
        assert_eq!(repair.messages.len(), 4);
        assert_eq!(repair.messages[2].role, Role::Assistant);
        assert!(repair.messages[3].content.contains("INVALID OUTPUT"));
    }

    #[tokio::test]
    async fn recommend_gives_up_after_one_repair() {
        let backend = RecordingBackend::replying(vec![
            Ok("{\"protocol_name\": \"x\"}".to_string()),
            Ok("{\"still\": \"wrong\"}".to_string()),
        ]);
        let pipeline = GenerationPipeline::new(backend.clone());

        let err = pipeline.recommend("swap", None).await.unwrap_err();
        match err {
            PipelineError::SchemaNonconformance { raw_output, .. } => {
                assert_eq!(raw_output, "{\"still\": \"wrong\"}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn recommend_keeps_context_on_repair() {
        let store = DocumentStore::new();
        store.append(Document::new(json!({"tvl": 5}))).await;
        let backend = RecordingBackend::replying(vec![Ok("nope".to_string()), Ok(schema_json())]);
        let pipeline = GenerationPipeline::new(backend.clone());

        pipeline.recommend("swap", Some(&store)).await.unwrap();
        let requests = backend.requests();
        assert_eq!(requests[0].documents, requests[1].documents);
        assert_eq!(requests[1].documents.len(), 1);
    }

    #[tokio::test]
    async fn fetch_and_record_then_grounded_generation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/defi/pool/metrics"))
            .and(query_param("blockchain", "ethereum"))
            .and(query_param("pair_address", "0xabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"liquidity": 100})))
            .mount(&server)
            .await;

        let data = UnleashClient::new(server.uri(), "key", Duration::from_secs(2)).unwrap();
        let store = DocumentStore::new();
        let query = DataQuery::PoolMetrics {
            blockchain: "ethereum".to_string(),
            pair_address: "0xabc".to_string(),
        };
        data.fetch_and_record(&query, &store).await.unwrap();
        assert_eq!(store.len().await, 1);

        let backend = RecordingBackend::replying(vec![Ok(schema_json())]);
        let pipeline = GenerationPipeline::new(backend.clone());
        let out = pipeline
            .generate_grounded("best yield route", &store)
            .await
            .unwrap();
        assert_eq!(out, schema_json());

        let requests = backend.requests();
        assert_eq!(
            requests[0].documents,
            vec![Document::new(json!({"liquidity": 100}))]
        );
        assert_eq!(requests[0].messages[1].content, "best yield route");
    }
}
