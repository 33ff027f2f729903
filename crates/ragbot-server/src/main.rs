use anyhow::{Context, Result};
use clap::Parser;
use ragbot_config::{ChatbotConfig, CliOverrides};
use ragbot_core::{ConversationalPipeline, ModelRegistry, PipelineSettings, RegistryLimits};
use ragbot_retrieval::{BackendSettings, CorpusModelLoader, IndexSettings};
use ragbot_server::{AppState, router};
use ragbot_session::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Ragbot: a retrieval-augmented chatbot over HTTP
#[derive(Parser, Debug)]
#[command(name = "ragbot", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long)]
    bind: Option<String>,

    /// Directory for the embedding cache and chat histories
    #[arg(long)]
    persist_dir: Option<PathBuf>,

    /// Directory holding the documents to index
    #[arg(long)]
    retrieval_dir: Option<PathBuf>,

    /// Keep chat histories in memory only
    #[arg(long)]
    ephemeral_history: bool,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    let config = ChatbotConfig::load(CliOverrides {
        bind: cli.bind,
        persist_dir: cli.persist_dir,
        corpus_dir: cli.retrieval_dir,
    })
    .context("failed to load configuration")?;

    let history: Arc<dyn HistoryStore> = if cli.ephemeral_history {
        tracing::warn!("Chat histories are kept in memory and lost on restart");
        Arc::new(MemoryHistoryStore::new())
    } else {
        Arc::new(
            FileHistoryStore::new(config.persist_dir.clone())
                .await
                .with_context(|| {
                    format!("failed to open chat histories under {}", config.persist_dir.display())
                })?,
        )
    };

    let loader = CorpusModelLoader::new(
        IndexSettings {
            corpus_dir: config.corpus_dir.clone(),
            persist_dir: config.persist_dir.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            embedding_model: config.embedding_model.clone(),
            target_source_chunks: config.target_source_chunks,
        },
        BackendSettings {
            base_url: config.api_base_url.clone(),
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
            ..BackendSettings::default()
        },
    );

    let registry = Arc::new(ModelRegistry::new(
        Arc::new(loader),
        Arc::clone(&history),
        RegistryLimits {
            max_sessions: config.max_sessions,
            idle_ttl: config.session_idle_ttl,
        },
    ));

    if let Some(credential) = &config.openai_api_key {
        registry
            .ensure_global(credential)
            .await
            .context("failed to initialize the global model from CHATBOT_OPENAI_API_KEY")?;
    }

    let pipeline = Arc::new(ConversationalPipeline::new(
        history,
        PipelineSettings {
            history_turns: config.history_turns,
            llm_timeout: config.llm_timeout,
            retrieval_timeout: config.retrieval_timeout,
            max_concurrent: config.max_concurrent_asks,
        },
    ));

    let app = router(AppState { registry, pipeline });

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("Ragbot listening on {}", listener.local_addr()?);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .context("server error")?;

    tracing::info!("Ragbot stopped");
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown requested, draining in-flight requests");
    token.cancel();
}
