use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use defiopt_core::ingest::types::{is_known_blockchain, is_known_protocol, KNOWN_BLOCKCHAINS};
use defiopt_core::ingest::{DataQuery, MarketDataProvider, Page, UnleashClient};
use defiopt_core::llm::cohere::CohereClient;
use defiopt_core::pipeline::GenerationPipeline;
use defiopt_core::storage::DocumentStore;

#[derive(Debug, Parser)]
#[command(name = "defiopt_worker")]
struct Args {
    /// Chain to load protocol context for.
    #[arg(long, default_value = "ethereum")]
    blockchain: String,

    /// Protocol whose pools and metadata are loaded as context.
    #[arg(long)]
    protocol: String,

    /// Question asked once the context is loaded.
    #[arg(long)]
    prompt: Option<String>,

    /// Page size for pool listings.
    #[arg(long, default_value_t = 10)]
    limit: u32,

    /// Load context only; skip the LLM call.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = defiopt_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if !is_known_protocol(&args.protocol) {
        tracing::warn!(protocol = %args.protocol, "protocol not in known list; querying anyway");
    }
    if !is_known_blockchain(&args.blockchain) {
        tracing::warn!(
            blockchain = %args.blockchain,
            known = ?KNOWN_BLOCKCHAINS,
            "blockchain not in known list; querying anyway"
        );
    }

    let data = UnleashClient::from_settings(&settings)?;
    let store = DocumentStore::new();
    let page = Page {
        offset: Some(0),
        limit: Some(args.limit),
    };

    let queries = [
        DataQuery::SupportedProtocols {
            blockchain: args.blockchain.clone(),
        },
        DataQuery::ProtocolMetadata {
            blockchain: args.blockchain.clone(),
            protocol: args.protocol.clone(),
            page,
        },
        DataQuery::PoolsByProtocol {
            protocol: args.protocol.clone(),
            page,
        },
    ];

    for query in &queries {
        if let Err(err) = data.fetch_and_record(query, &store).await {
            sentry::capture_error(&err);
            tracing::warn!(
                endpoint = %query.endpoint(),
                kind = err.kind(),
                error = %err,
                "context fetch failed; skipping"
            );
        }
    }

    let recorded = store.len().await;
    if args.dry_run {
        tracing::info!(
            blockchain = %args.blockchain,
            protocol = %args.protocol,
            dry_run = true,
            recorded,
            "context loaded (dry-run)"
        );
        return Ok(());
    }

    let llm = CohereClient::from_settings(&settings)?;
    let pipeline = GenerationPipeline::new(Arc::new(llm));
    let prompt = args.prompt.unwrap_or_else(|| {
        format!(
            "What is the safest way to earn yield with {} on {}?",
            args.protocol, args.blockchain
        )
    });

    match pipeline.recommend(&prompt, Some(&store)).await {
        Ok(recommendation) => {
            let out = serde_json::to_string_pretty(&recommendation)
                .context("failed to serialize recommendation")?;
            println!("{out}");
            tracing::info!(
                protocol = %recommendation.protocol_name,
                steps = recommendation.protocol_steps.len(),
                recorded,
                "recommendation generated"
            );
            Ok(())
        }
        Err(err) => {
            let kind = err.kind();
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(kind, error = %err, "recommendation run failed");
            Err(err)
        }
    }
}

fn init_sentry(settings: &defiopt_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
