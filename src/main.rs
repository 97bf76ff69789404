use std::sync::Arc;

use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use github_global::api::{AppState, api_routes};
use github_global::config::AppConfig;
use github_global::llm::{ModelFallback, OpenRouterClient};
use github_global::queue::JobEvent;
use github_global::ratelimit::RateLimiter;
use github_global::store::{InMemoryStore, LocalWorkspace};
use github_global::translation::{TranslationEngine, TranslationQueue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("🌐 GitHub Global v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   OpenRouter: {}", config.openrouter.base_url);
    eprintln!("   Models: {}", config.model_priority.join(" → "));
    eprintln!("   Workspace: {}", config.workspace_root.display());
    eprintln!("   Concurrency: {}", config.queue.concurrency);
    eprintln!("   API: http://0.0.0.0:{}/api/translations", config.port);
    match config.engine.free_tier {
        Some(limits) => eprintln!(
            "   Free tier: {} tasks/day, {} files/task, {} chars/file",
            limits.daily_tasks, limits.files_per_task, limits.chars_per_file
        ),
        None => eprintln!("   Free tier: unlimited"),
    }
    if config.platform_api_key.is_none() {
        eprintln!("   Warning: OPENROUTER_API_KEY not set, only users with their own key can translate");
    }

    // ── LLM ─────────────────────────────────────────────────────────────
    let client = Arc::new(OpenRouterClient::new(config.openrouter.clone())?);
    let fallback = Arc::new(ModelFallback::new(
        client,
        config.model_priority.clone(),
        config.retry,
    ));

    // ── Storage ─────────────────────────────────────────────────────────
    tokio::fs::create_dir_all(&config.workspace_root).await?;
    let store = Arc::new(InMemoryStore::new());
    let repo = Arc::new(LocalWorkspace::new(config.workspace_root.clone()));

    // ── Queue + Engine ──────────────────────────────────────────────────
    let queue = TranslationQueue::with_config(&config.queue);
    let engine = Arc::new(TranslationEngine::new(
        fallback,
        store.clone(),
        repo,
        config.engine.clone(),
        config.platform_api_key.clone(),
    ));
    engine.attach(&queue);

    let mut events = BroadcastStream::new(queue.subscribe());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(JobEvent::Active(job)) => {
                    info!(job_id = %job.id, task_id = %job.data.task_id, "Translation job started");
                }
                Ok(JobEvent::Completed(job)) => {
                    if let Some(summary) = &job.result {
                        info!(
                            job_id = %job.id,
                            task_id = %summary.task_id,
                            status = %summary.status,
                            completed = summary.completed_files,
                            failed = summary.failed_files,
                            "Translation job completed"
                        );
                    }
                }
                Ok(JobEvent::Failed(job)) => {
                    warn!(
                        job_id = %job.id,
                        task_id = %job.data.task_id,
                        error = job.error.as_deref().unwrap_or("unknown"),
                        "Translation job failed"
                    );
                }
                Err(e) => warn!(error = %e, "Job event stream lagged"),
            }
        }
    });

    // ── HTTP ────────────────────────────────────────────────────────────
    let limiter = RateLimiter::new(store.clone(), config.engine.free_tier);
    let app = api_routes(AppState {
        store,
        queue,
        models: config.model_priority.clone(),
        limiter,
        progress_interval: config.progress_interval,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!(port = config.port, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            eprintln!("\nShutting down...");
        })
        .await?;

    Ok(())
}
