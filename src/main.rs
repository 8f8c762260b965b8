use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use cauldron_assist::assistant::cli::TerminalChat;
use cauldron_assist::assistant::{
    AssistantState, CommandRecognizer, ContextResolver, ConversationRenderer, Dispatcher,
    SessionStore, SpeechRecognizer, assistant_routes, build_backend,
};
use cauldron_assist::bridge::{AgentProcess, BridgeState, bridge_routes, health_routes};
use cauldron_assist::config::{AssistConfig, ChatBackendKind};
use cauldron_assist::permissions::{PermissionChecker, PermissionGate};
use cauldron_assist::preferences::{PreferencesState, PreferencesStore, preferences_routes};
use cauldron_assist::store::LibSqlBackend;
use cauldron_assist::tenancy::{TenancyState, tenancy_routes};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if parsed.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(parsed)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AssistConfig::from_env();

    // Initialize tracing; a rolling file is added when LOG_FILE_PATH is set.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "cauldron-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    eprintln!("🧪 Cauldron Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Deployment: {}", config.deployment);
    eprintln!("   HTTP: http://0.0.0.0:{}", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Assistant ────────────────────────────────────────────────────────
    let agent = Arc::new(AgentProcess::new(config.bridge.clone()));
    let backend = build_backend(&config, agent.clone());
    eprintln!(
        "   Chat backend: {}{}",
        backend.name(),
        match config.backend {
            ChatBackendKind::BridgeHttp => match &config.service_user {
                Some(user) => format!(" ({} as {user})", config.bridge_url),
                None => format!(" ({})", config.bridge_url),
            },
            _ => String::new(),
        }
    );

    let store = SessionStore::open(db.clone())
        .await
        .context("loading assistant session")?;
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        backend,
        config.dispatch_timeout,
    ));
    let resolver = Arc::new(ContextResolver::with_defaults());
    let prefs = Arc::new(PreferencesStore::new(db.clone()));

    // ── Routes ───────────────────────────────────────────────────────────
    let checker = PermissionChecker::new(db.clone());
    let bridge = bridge_routes(BridgeState {
        agent,
        deployment: config.deployment,
    });
    let bridge = if config.enforce_permissions {
        PermissionGate::new(checker.clone(), "module:access").protect(bridge)
    } else {
        bridge
    };

    let app = Router::new()
        .merge(health_routes(config.deployment))
        .merge(bridge)
        .merge(assistant_routes(AssistantState {
            store: store.clone(),
            dispatcher: dispatcher.clone(),
            resolver: resolver.clone(),
            renderer: Arc::new(ConversationRenderer::new()),
        }))
        .merge(preferences_routes(PreferencesState {
            prefs: prefs.clone(),
        }))
        .merge(tenancy_routes(TenancyState {
            directory: db.clone(),
            checker,
            enforce: config.enforce_permissions,
        }))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    eprintln!(
        "   Permissions: {}",
        if config.enforce_permissions { "enforced" } else { "open" }
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    if !config.cli {
        axum::serve(listener, app).await?;
        return Ok(());
    }

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    // ── Terminal chat ────────────────────────────────────────────────────
    let recognizer = config
        .speech_command
        .clone()
        .map(|argv| Arc::new(CommandRecognizer::new(argv)) as Arc<dyn SpeechRecognizer>);
    eprintln!(
        "   Voice input: {}",
        if recognizer.is_some() { "enabled (/listen)" } else { "disabled" }
    );
    eprintln!("   Type a message and press Enter. /quit to exit.\n");

    TerminalChat::new(dispatcher, resolver, prefs, recognizer).run().await;
    Ok(())
}
