//! chat-relay HTTP server
//!
//! Starts an Axum web server that relays streaming chat completions.

use chat_relay::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    telemetry,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Wrote configuration template to {}", path.display());
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level, config.observability.log_format);

    tracing::info!(
        provider_base_url = %config.provider.base_url(),
        model = %config.provider.model(),
        request_timeout_seconds = config.server.request_timeout_seconds,
        "Starting chat-relay on {}:{}",
        config.server.host,
        config.server.port
    );

    // Provider client and credentials are built once and shared by all requests
    let config = Arc::new(config);
    let state = AppState::from_config(config.clone())?;
    let app = handlers::router(state);

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Chat endpoint available at http://{}/api/chat", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
