//! Service entry point: loads configuration, connects the database, builds
//! every pluggable provider and subsystem, spawns the background workers,
//! and serves the HTTP API until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use similarity_engine::batch::provider::HttpBatchProvider;
use similarity_engine::batch::BatchOrchestrator;
use similarity_engine::chat::ChatEngine;
use similarity_engine::config::Config;
use similarity_engine::db::Store;
use similarity_engine::embedding::build_embedder;
use similarity_engine::http::rate_limit::RateLimiter;
use similarity_engine::http::{build_router, AppState};
use similarity_engine::keywords::KeywordService;
use similarity_engine::llm::litellm::LiteLlmClient;
use similarity_engine::llm::LlmClient;
use similarity_engine::reranker::build_reranker;
use similarity_engine::search::SimilarityEngine;
use similarity_engine::workers;
use tokio::sync::watch;

fn init_tracing() {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::from_env();

    let store = Store::connect(&cfg.database).await?;
    store.migrate().await?;
    store.ensure_bootstrap_api_key(&cfg.api_key).await?;

    let embedder: Arc<dyn similarity_engine::embedding::Embedder> =
        Arc::from(build_embedder(&cfg.embedding, &cfg.bind_addr)?);
    let reranker: Arc<dyn similarity_engine::reranker::Reranker> = Arc::from(build_reranker(&cfg.reranker));
    let keywords = Arc::new(KeywordService::new(store.clone()));
    let llm: Arc<dyn LlmClient> = Arc::new(LiteLlmClient::new(cfg.llm.clone(), keywords.clone()));
    let similarity = Arc::new(SimilarityEngine::new(
        store.clone(),
        cfg.similarity.default_limit,
        cfg.similarity.candidate_limit,
    ));
    let chat_engine = Arc::new(ChatEngine::new(
        store.clone(),
        embedder.clone(),
        similarity.clone(),
        keywords.clone(),
        llm.clone(),
        cfg.similarity.chat_threshold,
        cfg.similarity.candidate_limit,
    ));
    let batch_provider = Arc::new(HttpBatchProvider::new(&cfg.batch));
    let batch = Arc::new(BatchOrchestrator::new(
        store.clone(),
        batch_provider,
        llm.clone(),
        keywords.clone(),
        cfg.batch.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let summarizer_store = store.clone();
    let summarizer_llm = llm.clone();
    let summarizer_cfg = cfg.worker.clone();
    let summarizer_shutdown = shutdown_rx.clone();
    let summarizer_handle = tokio::spawn(async move {
        workers::supervise("summarizer", summarizer_cfg, summarizer_shutdown, || {
            workers::summarizer::run_cycle(&summarizer_store, &summarizer_llm)
        })
        .await;
    });

    let embedder_store = store.clone();
    let embedder_for_worker = embedder.clone();
    let embedder_cfg = cfg.worker.clone();
    let embedder_shutdown = shutdown_rx.clone();
    let embedder_handle = tokio::spawn(async move {
        workers::supervise("embedder", embedder_cfg, embedder_shutdown, || {
            workers::embedder::run_cycle(&embedder_store, &embedder_for_worker)
        })
        .await;
    });

    let batch_monitor = batch.clone();
    let batch_cfg = cfg.worker.clone();
    let batch_shutdown = shutdown_rx.clone();
    let batch_handle = tokio::spawn(async move {
        workers::supervise("batch-monitor", batch_cfg, batch_shutdown, || async {
            batch_monitor.monitor_once().await.map(|_| 0usize).map_err(|e| Box::from(e.to_string()) as workers::WorkerError)
        })
        .await;
    });

    let state = AppState {
        store: store.clone(),
        embedder,
        reranker,
        similarity,
        keywords,
        llm,
        chat_engine,
        batch,
        similarity_rate_limiter: Arc::new(RateLimiter::new(cfg.rate_limit.similarity_per_minute)),
        embedding_rate_limiter: Arc::new(RateLimiter::new(cfg.rate_limit.embedding_per_minute)),
        reranker_max_candidates: cfg.reranker.max_candidates,
        reranker_enabled: cfg.reranker.enabled,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown_tx))
        .await?;

    let _ = tokio::join!(summarizer_handle, embedder_handle, batch_handle);
    Ok(())
}

/// Wait for SIGINT/SIGTERM, then flip the shutdown watch so every worker
/// loop finishes its current item and exits (§5: "SIGINT/SIGTERM cause
/// loops to finish the current item").
async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
}
