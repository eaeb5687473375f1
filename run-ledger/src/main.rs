use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use run_ledger::{
    config::Config, db, generator::TemplateGenerator, store::SqliteStore, AppState, RunDefaults,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "run_ledger=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(port = config.port, "run-ledger starting");

    // Database
    let pool = db::connect(&config.database_url).await?;
    info!(url = %config.database_url, "database ready");

    let state = Arc::new(AppState::new(
        Arc::new(SqliteStore::new(pool)),
        Arc::new(TemplateGenerator),
        RunDefaults {
            window_size: config.default_window_size,
            run_key: config.default_run_key.clone(),
        },
    ));

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let app = run_ledger::app(state).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
