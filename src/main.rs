use axum::{routing::{get}, Router};
use std::env;
use tokio::net::TcpListener;
use tower_http::{trace::TraceLayer, cors::{Any, CorsLayer}};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use axum::extract::DefaultBodyLimit;

mod config;
mod error;
mod models;
mod query;
mod routes;
mod store;
mod uploads;
mod validation;

use config::Config;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into())
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();
    let store = store::Store::initialize(&cfg.database_file)?;
    let uploads = uploads::Uploads::new(&cfg.upload_dir);
    uploads.ensure_dir().await?;

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(AppState { store, uploads }))
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on http://0.0.0.0:{}", cfg.port);

    axum::serve(listener, app).await?;
    Ok(())
}
