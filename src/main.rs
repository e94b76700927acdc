use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasklist::api::router;
use tasklist::backend::PersistenceBackend;
use tasklist::config::AppConfig;
use tasklist::firestore::FirestoreClient;
use tasklist::state::AppState;
use tasklist::store::TaskStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tasklist=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let backend = match config.firestore.clone() {
        Some(firestore) => {
            info!(
                "using Firestore project {} collection {}",
                firestore.project_id, firestore.collection
            );
            PersistenceBackend::remote(FirestoreClient::new(firestore)?)
        }
        None => {
            info!("FIRESTORE_PROJECT_ID not set, tasks will reset on restart");
            PersistenceBackend::None
        }
    };

    let state = AppState::new(TaskStore::new(backend));
    let store = state.store.clone();

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.flush().await;
    store.close();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
