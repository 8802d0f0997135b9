use anyhow::Result;
use clap::Parser;
use sitesearch_core::{AppConfig, IndexStore};
use sitesearch_crawler::Controller;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the configured sites into the index store")]
struct Cli {
    /// JSON configuration listing the sites to crawl
    #[arg(long, default_value = "./config.json")]
    config: String,
    /// Index store directory
    #[arg(long, default_value = "./data")]
    data: String,
    /// Re-index this single page instead of crawling every site
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    let config = AppConfig::load(&args.config)?;
    let store = Arc::new(IndexStore::open(&args.data)?);
    let controller = Controller::new(config, store.clone())?;

    if let Some(url) = args.url {
        let page = controller.index_page(&url)?.await??;
        tracing::info!(path = %page.path, code = page.code, "page indexed");
    } else {
        controller.start_indexing().await?;
        tokio::select! {
            _ = controller.wait_for_crawl() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted, stopping crawl");
                controller.stop_indexing().await?;
            }
        }
    }

    store.flush()?;
    println!("{}", serde_json::to_string_pretty(&controller.statistics()?)?);
    Ok(())
}
