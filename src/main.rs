//! Jeopardy Back binary entrypoint wiring REST, WebSocket and question storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jeopardy_back::{
    config::AppConfig,
    dao::question_store::{QuestionStore, memory::MemoryQuestionStore},
    routes,
    services::token_service::TokenService,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let tokens = match TokenService::from_env() {
        Ok(tokens) => Some(tokens),
        Err(err) => {
            warn!(error = %err, "token keys unavailable; joins will be refused");
            None
        }
    };
    let app_state = AppState::new(config, tokens);

    install_question_store(app_state.clone()).await;
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// MongoDB when `MONGO_URI` is set, the JSON seed file otherwise.
async fn install_question_store(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    if env::var_os("MONGO_URI").is_some() {
        use jeopardy_back::{
            dao::{
                question_store::mongodb::{MongoConfig, MongoQuestionStore},
                storage::StorageError,
            },
            services::storage_supervisor,
        };

        tokio::spawn(storage_supervisor::run(state, || async {
            let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
            let store = MongoQuestionStore::connect(config)
                .await
                .map_err(StorageError::from)?;
            let store: Arc<dyn QuestionStore> = Arc::new(store);
            Ok(store)
        }));
        return;
    }

    let path = state.config().questions_path.clone();
    match MemoryQuestionStore::load(&path) {
        Ok(store) => {
            info!(path = %path.display(), "serving questions from seed file");
            let store: Arc<dyn QuestionStore> = Arc::new(store);
            state.set_question_store(store).await;
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "could not load questions; staying in degraded mode");
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
