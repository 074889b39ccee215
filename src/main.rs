use std::env;

use thumbkeep::{app, utils::config::ServiceConfig};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "thumbkeep=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry
            .with(JsonStorageLayer)
            .with(BunyanFormattingLayer::new(
                "thumbkeep".into(),
                std::io::stdout,
            ))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServiceConfig::from_env();
    let addr = config.bind_addr.clone();

    let app = match app(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to initialize thumbnail store");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    info!("Server starting at http://{}", addr);

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!(error = %e, "Server error");
    }
}
