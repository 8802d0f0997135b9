use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sitesearch_core::config::default_fields;
use sitesearch_core::stats::Statistics;
use sitesearch_core::{AppConfig, IndexStore, Lemmatizer, NewPage, PageIndexer, Site};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Inspect and maintain a site search index store", long_about = None)]
struct Cli {
    /// Index store directory
    #[arg(long, default_value = "./data")]
    data: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print totals and per-site statistics as JSON
    Stats,
    /// Re-derive lemma frequencies from postings and report mismatches
    Verify {
        /// Only check the site with this root URL
        #[arg(long)]
        site: Option<String>,
    },
    /// Re-index every stored page from its saved content
    Rebuild {
        /// Configuration providing the field weights; defaults apply without it
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let store = Arc::new(IndexStore::open(&cli.data)?);

    match cli.command {
        Commands::Stats => {
            let stats = Statistics::collect(&store, false)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Verify { site } => verify(&store, site.as_deref())?,
        Commands::Rebuild { config } => {
            let fields = match config {
                Some(path) => AppConfig::load(path)?.fields,
                None => default_fields(),
            };
            rebuild(&store, PageIndexer::new(store.clone(), Lemmatizer::russian(), fields)?)?;
            store.flush()?;
        }
    }
    Ok(())
}

fn selected_sites(store: &IndexStore, url: Option<&str>) -> Result<Vec<Site>> {
    let sites = store.list_sites()?;
    match url {
        None => Ok(sites),
        Some(url) => {
            let wanted = url.trim_end_matches('/');
            let found: Vec<Site> = sites.into_iter().filter(|s| s.url.trim_end_matches('/') == wanted).collect();
            if found.is_empty() {
                bail!("no site {url} in store");
            }
            Ok(found)
        }
    }
}

fn verify(store: &IndexStore, url: Option<&str>) -> Result<()> {
    let mut bad = 0usize;
    for site in selected_sites(store, url)? {
        let mismatches = store.frequency_mismatches(site.id)?;
        for (lemma, pages) in &mismatches {
            tracing::warn!(site = %site.url, lemma = %lemma.lemma, frequency = lemma.frequency, pages, "frequency mismatch");
        }
        tracing::info!(site = %site.url, lemmas = store.count_lemmas(site.id)?, mismatches = mismatches.len(), "site verified");
        bad += mismatches.len();
    }
    if bad > 0 {
        bail!("{bad} lemma frequencies disagree with their postings");
    }
    println!("ok");
    Ok(())
}

fn rebuild(store: &IndexStore, indexer: PageIndexer) -> Result<()> {
    for site in store.list_sites()? {
        let pages = store.pages_for_site(site.id)?;
        let mut postings = 0usize;
        for old in &pages {
            let (_, written) = indexer.store_page(NewPage {
                site_id: old.site_id,
                path: old.path.clone(),
                code: old.code,
                content: old.content.clone(),
            })?;
            postings += written;
        }
        tracing::info!(site = %site.url, pages = pages.len(), postings, "site rebuilt");
    }
    Ok(())
}
