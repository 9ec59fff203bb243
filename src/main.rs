use std::sync::Arc;

use futures::StreamExt;

use quantabot::channels::{Channel, CliChannel, TelegramChannel};
use quantabot::collab::{
    BuiltinStatsEngine, CsvDatasetLoader, MarkdownDocumentEngine, PlottersChartEngine,
};
use quantabot::config::EngineConfig;
use quantabot::engine::menu::MenuBuilder;
use quantabot::engine::router::{EngineDeps, StateRouter};
use quantabot::llm::{create_provider, Interpreter, LlmBackend, LlmConfig};
use quantabot::store::{LibSqlBackend, ProjectStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; QUANTABOT_LOG_DIR switches to daily rolling files.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match std::env::var("QUANTABOT_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "quantabot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    let config = EngineConfig::from_env();
    tokio::fs::create_dir_all(&config.data_dir).await.ok();

    eprintln!("📊 quantabot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data dir: {}", config.data_dir.display());

    // ── LLM (optional — templates take over when unset) ─────────────────
    let llm = match std::env::var("ANTHROPIC_API_KEY").ok() {
        Some(api_key) => {
            let model = std::env::var("QUANTABOT_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
            eprintln!("   LLM: anthropic ({model})");
            let llm_config = LlmConfig {
                backend: LlmBackend::Anthropic,
                api_key: secrecy::SecretString::from(api_key),
                model,
            };
            Some(create_provider(&llm_config)?)
        }
        None => {
            eprintln!("   LLM: disabled (set ANTHROPIC_API_KEY to enable interpretations)");
            None
        }
    };
    let interpreter = Arc::new(Interpreter::new(llm, config.llm_timeout));

    // ── Database ────────────────────────────────────────────────────────
    let db_path =
        std::env::var("QUANTABOT_DB_PATH").unwrap_or_else(|_| "./data/quantabot.db".to_string());
    let store: Arc<dyn ProjectStore> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Engine ──────────────────────────────────────────────────────────
    let menu = MenuBuilder::new(config.max_menu_columns, config.categorical_cardinality);
    let deps = Arc::new(EngineDeps {
        config,
        store,
        datasets: Arc::new(CsvDatasetLoader::new()),
        stats: Arc::new(BuiltinStatsEngine::new()),
        charts: Arc::new(PlottersChartEngine::new()),
        documents: Arc::new(MarkdownDocumentEngine::new()),
        interpreter,
        menu,
    });
    let router = Arc::new(StateRouter::new(deps));

    // Idle-session sweeper.
    {
        let sessions = router.sessions();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(600));
            loop {
                tick.tick().await;
                let pruned = sessions.prune_idle().await;
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned idle sessions");
                }
            }
        });
    }

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels: Vec<Arc<dyn Channel>> = vec![Arc::new(CliChannel::new())];
    if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
        let allowed_users: Vec<String> = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                allowed_users.join(", ")
            }
        );
        channels.push(Arc::new(TelegramChannel::new(token, allowed_users)));
    }
    eprintln!(
        "   Channels: {}\n",
        channels.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
    );

    let mut streams = Vec::new();
    for (idx, channel) in channels.iter().enumerate() {
        let stream = channel.start().await?;
        streams.push(stream.map(move |msg| (idx, msg)).boxed());
    }
    let mut inbound = futures::stream::select_all(streams);

    // One task per turn: a slow step blocks only its own session, never
    // the other channels or users.
    while let Some((idx, msg)) = inbound.next().await {
        let router = Arc::clone(&router);
        let channel = Arc::clone(&channels[idx]);
        tokio::spawn(async move {
            let reply = router.handle_turn(&msg.user_id, &msg.text).await;
            if let Err(e) = channel.respond(&msg, reply).await {
                tracing::error!(channel = channel.name(), "Failed to respond: {e}");
            }
        });
    }

    Ok(())
}
