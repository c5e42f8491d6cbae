use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turbot::api::{create_router, AppState};
use turbot::config::Config;
use turbot::db::{LibSqlVectorStore, VectorStore};
use turbot::embeddings::EmbeddingProvider;
use turbot::llm::LlmProvider;
use turbot::session::{SessionJanitor, SessionStore};

#[derive(Parser)]
#[command(name = "turbot")]
#[command(about = "RAG backend for Serbian tourism agencies")]
struct Args {
    /// Ingest every PDF in this directory before serving
    #[arg(long)]
    ingest_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turbot=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Initializing vector store: {}...", config.database.url);
    let store: Arc<dyn VectorStore> = Arc::new(
        LibSqlVectorStore::new(&config.database, config.embeddings.dimensions).await?,
    );

    tracing::info!("Initializing embedding provider: {}...", config.embeddings.model);
    let embeddings = EmbeddingProvider::new(&config.embeddings)?;

    if let Some(llm_config) = &config.llm {
        tracing::info!("Initializing LLM provider: {}...", llm_config.model);
    }
    let llm = LlmProvider::new(config.llm.as_ref());
    if !llm.is_available() {
        tracing::warn!(
            "LLM unavailable - query rewriting, filter extraction and answer \
             generation degrade to rule-based behavior"
        );
    }

    let sessions = Arc::new(SessionStore::new(&config.session)?);

    let state = AppState::new(config.clone(), store, sessions, embeddings, llm);

    if let Some(dir) = &args.ingest_dir {
        ingest_directory(&state, dir).await?;
    }

    let cancel_token = CancellationToken::new();

    tracing::info!("Starting session janitor...");
    let janitor = SessionJanitor::new(
        state.sessions.clone(),
        state.config.session.janitor_interval_secs,
    );
    let token = cancel_token.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Session janitor shutting down...");
                    break;
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(janitor.interval_secs())) => {
                    if let Err(e) = janitor.run_once().await {
                        tracing::error!("Session janitor error: {}", e);
                    }
                }
            }
        }
    });

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("TurBot starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    Ok(())
}

async fn ingest_directory(state: &AppState, dir: &PathBuf) -> anyhow::Result<()> {
    tracing::info!("Ingesting PDFs from {}...", dir.display());

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut processed = 0usize;
    let mut failed = 0usize;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let bytes = tokio::fs::read(&path).await?;
        match state.pipeline.ingest(filename, &bytes).await {
            Ok(report) => {
                tracing::info!(
                    filename,
                    chunks = report.chunks_created,
                    status = %report.status,
                    "Ingested"
                );
                processed += 1;
            }
            Err(e) => {
                tracing::error!(filename, error = %e, "Ingestion failed");
                failed += 1;
            }
        }
    }

    tracing::info!(processed, failed, "Directory ingestion complete");
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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

    tracing::info!("Shutdown signal received, cancelling background tasks...");
    cancel_token.cancel();
}
