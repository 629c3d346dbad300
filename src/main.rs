use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::info;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use event_scrape::scraping::DEFAULT_SITE_TIMEOUT;
use event_scrape::{
    store, AppConfig, Crawler, FetchSettings, ReqwestFetcher, SqliteStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(event_scrape::utils::config_path);
    let config = AppConfig::load(&config_path)?;
    if config.sites.is_empty() {
        anyhow::bail!("no sites configured in {}", config_path.display());
    }

    let catalog =
        Arc::new(SqliteStore::open_default().context("unable to open event database")?);
    store::seed_blacklists(
        catalog.as_ref(),
        &config.blacklisted_category_names,
        &config.blacklisted_pages,
    )
    .context("unable to seed blacklists")?;

    let fetcher =
        Arc::new(ReqwestFetcher::new(FetchSettings::default()).context("unable to build fetcher")?);
    let site_timeout = config
        .site_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SITE_TIMEOUT);

    let crawler = Crawler::new(fetcher, catalog, site_timeout);
    let summary = crawler.run_all(&config.sites).await;

    info!(
        "crawl finished: {} inserted, {} updated, {} skipped, {} site(s) failed",
        summary.inserted(),
        summary.updated(),
        summary.skipped(),
        summary.failed_sites()
    );
    Ok(())
}
