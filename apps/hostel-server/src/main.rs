use std::net::SocketAddr;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hostel_server::config::Config;
use hostel_server::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|err| panic!("invalid configuration: {err}"));
    let port = config.port;

    let state = AppState::from_config(config).unwrap_or_else(|err| panic!("failed to create rooms: {err}"));
    tracing::info!(
        rooms = ?state.hub.room_names(),
        history_capacity = state.hub.history_capacity(),
        message_cap = state.config.message_cap,
        "hostel-server configured"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    tracing::info!(%addr, "hostel-server listening");

    hostel_server::server::serve(listener, state.service, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await;
}
