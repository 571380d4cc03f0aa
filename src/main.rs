use std::sync::Arc;

use openai_mcp_server::{
    build_app,
    config::{self, Config},
    domain::tools::build_registry,
    logging,
    mcp::server::ProtocolServer,
    upstream::OpenAiClient,
    AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    if let Some(path) = config::load_dotenv() {
        info!(path = %path.display(), "loaded environment file");
    }
    let config = Config::from_env()?;

    let upstream = Arc::new(OpenAiClient::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        config.credential_source,
    ));
    let registry = build_registry(upstream)?;
    let state = AppState::new(ProtocolServer::new(registry));
    let app = build_app(state);

    let bind_socket = config.bind_socket()?;
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        upstream = %config.openai_base_url,
        credential_source = ?config.credential_source,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
