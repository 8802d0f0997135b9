use anyhow::Result;
use axum::Router;
use clap::Parser;
use sitesearch_core::{AppConfig, IndexStore};
use sitesearch_crawler::Controller;
use sitesearch_server::build_app;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON configuration listing the sites to crawl
    #[arg(long, default_value = "./config.json")]
    config: String,
    /// Index store directory
    #[arg(long, default_value = "./data")]
    data: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;
    let store = Arc::new(IndexStore::open(&args.data)?);
    let controller = Arc::new(Controller::new(config, store)?);
    let app: Router = build_app(controller);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
