use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use grid_mapreduce::cluster::handlers::handle_command;
use grid_mapreduce::cluster::http::HttpTransport;
use grid_mapreduce::cluster::protocol::ENDPOINT_COMMAND;
use grid_mapreduce::config::NodeConfig;
use grid_mapreduce::mapreduce::handlers::handle_word_count;
use grid_mapreduce::node::GridNode;
use grid_mapreduce::storage::handlers::{handle_get, handle_put};
use grid_mapreduce::storage::protocol::ENDPOINT_CACHE;
use grid_mapreduce::wordcount;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--peer <addr:port>]... [--workers <n>] [--timeout-ms <ms>] [--partitions <n>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:6000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:6001 --peer 127.0.0.1:6000",
            args[0]
        );

        std::process::exit(1);
    }

    let config = NodeConfig::from_args(&args)?;

    tracing::info!("Starting node on {}", config.bind);
    if !config.peers.is_empty() {
        tracing::info!("Peers: {:?}", config.peers);
    } else {
        tracing::info!("Starting as a single-member cluster");
    }

    // 1. Transport (static membership):
    let transport = Arc::new(HttpTransport::new(
        config.local_address(),
        config.peer_addresses(),
    ));

    // 2. Node services:
    let node = GridNode::clustered(transport, config.settings.clone());
    wordcount::register(&node.functions);

    // 3. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_COMMAND, post(handle_command))
        .route(&format!("{ENDPOINT_CACHE}/:name"), post(handle_put))
        .route(&format!("{ENDPOINT_CACHE}/:name/:key"), get(handle_get))
        .route("/mapreduce/wordcount", post(handle_word_count))
        .layer(Extension(node));

    // 4. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
