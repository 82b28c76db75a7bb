use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tokio::net::TcpListener;

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod store;
pub mod templates;

pub use config::Config;
pub use error::NotepadError;
pub use store::PageStore;
pub use templates::Templates;

// A single note: the title doubles as the file stem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub title: String,
    #[serde(serialize_with = "body_as_text")]
    pub body: Vec<u8>,
}

// View-model for the note list page
#[derive(Debug, Clone, Serialize)]
pub struct ListPageData {
    pub page_title: String,
    pub todos: Vec<Page>,
}

fn body_as_text<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

// Everything a handler needs, built once at startup and never mutated
pub struct AppState {
    pub store: PageStore,
    pub templates: Templates,
    pub list_title: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = PageStore::new(&config.notes_dir);
        store
            .ensure_dir()
            .await
            .context("failed to prepare notes directory")?;

        let templates = Templates::load(&config.template_dir).with_context(|| {
            format!(
                "failed to load templates from {}",
                config.template_dir.display()
            )
        })?;

        Ok(Self {
            store,
            templates,
            list_title: config.list_title.clone(),
        })
    }
}

/// Bind the configured address and serve until Ctrl-C or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let state = AppState::from_config(&config).await?;
    let app = routes::router(Arc::new(state));

    let addr = config.socket_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!(
        notes_dir = %config.notes_dir.display(),
        "The application is running on port {}...",
        config.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
}
