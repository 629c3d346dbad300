pub mod categories;
pub mod extract;
pub mod location;
pub mod normalize;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use scraper::Html;
use serde::Serialize;

use crate::config::SiteProfile;
use crate::error::{CrawlError, StoreError};
use crate::fetch::PageFetcher;
use crate::models::{Category, Location};
use crate::reconcile::{ReconcileOutcome, ReconciliationEngine};
use crate::store::CatalogStore;

use extract::SiteSelectors;

pub const DEFAULT_SITE_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-site tally for one crawl cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteOutcome {
    pub site: String,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_records: usize,
    pub failed_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SiteOutcome {
    fn failed(site: &str, err: &CrawlError) -> Self {
        Self {
            site: site.to_string(),
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub sites: Vec<SiteOutcome>,
}

impl CrawlSummary {
    pub fn inserted(&self) -> usize {
        self.sites.iter().map(|s| s.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.sites.iter().map(|s| s.updated).sum()
    }

    pub fn skipped(&self) -> usize {
        self.sites.iter().map(|s| s.skipped_records).sum()
    }

    pub fn failed_sites(&self) -> usize {
        self.sites.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Drives one crawl cycle: one isolated task per site, each under its own
/// timeout, so a broken or slow site never affects the others.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn CatalogStore>,
    reconciler: Arc<ReconciliationEngine>,
    site_timeout: Duration,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn CatalogStore>,
        site_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            reconciler: Arc::new(ReconciliationEngine::new()),
            site_timeout,
        }
    }

    pub async fn run_all(&self, sites: &[SiteProfile]) -> CrawlSummary {
        let mut handles = Vec::with_capacity(sites.len());
        for profile in sites.iter().cloned() {
            let fetcher = self.fetcher.clone();
            let store = self.store.clone();
            let reconciler = self.reconciler.clone();
            let timeout = self.site_timeout;
            handles.push((
                profile.name.clone(),
                tokio::spawn(async move {
                    match tokio::time::timeout(
                        timeout,
                        crawl_site(fetcher, store, reconciler, profile),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            let err = CrawlError::Timeout {
                                seconds: timeout.as_secs(),
                            };
                            SiteOutcome::failed("", &err)
                        }
                    }
                }),
            ));
        }

        let mut summary = CrawlSummary::default();
        for (site, handle) in handles {
            let outcome = match handle.await {
                Ok(mut outcome) => {
                    if outcome.site.is_empty() {
                        outcome.site = site.clone();
                    }
                    outcome
                }
                Err(err) => SiteOutcome {
                    site: site.clone(),
                    error: Some(format!("site task panicked: {err}")),
                    ..SiteOutcome::default()
                },
            };
            if let Some(error) = &outcome.error {
                warn!("site {site}: {error}");
            } else {
                info!(
                    "site {site}: {} inserted, {} updated, {} unchanged, {} skipped",
                    outcome.inserted, outcome.updated, outcome.unchanged, outcome.skipped_records
                );
            }
            summary.sites.push(outcome);
        }
        summary
    }
}

async fn crawl_site(
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn CatalogStore>,
    reconciler: Arc<ReconciliationEngine>,
    profile: SiteProfile,
) -> SiteOutcome {
    let mut outcome = SiteOutcome {
        site: profile.name.clone(),
        ..SiteOutcome::default()
    };

    let selectors = match SiteSelectors::compile(&profile) {
        Ok(selectors) => selectors,
        Err(err) => return SiteOutcome::failed(&profile.name, &err),
    };
    let (name_blacklist, page_blacklist) = match load_blacklists(store.as_ref()) {
        Ok(blacklists) => blacklists,
        Err(err) => return SiteOutcome::failed(&profile.name, &CrawlError::Store(err)),
    };

    // Category listing page drives everything else for the site.
    let category_html = match fetcher.fetch(&profile.category_page).await {
        Ok(html) => html,
        Err(err) => return SiteOutcome::failed(&profile.name, &CrawlError::Fetch(err)),
    };
    let categories = resolve_page_categories(&category_html, &selectors, &profile, &name_blacklist);
    for category in &categories {
        if let Err(err) = store.upsert_category(category) {
            return SiteOutcome::failed(&profile.name, &CrawlError::Store(err));
        }
    }

    let site_location = fetch_location(fetcher.as_ref(), &selectors, &profile).await;
    if let Err(err) = store.upsert_location(&site_location) {
        return SiteOutcome::failed(&profile.name, &CrawlError::Store(err));
    }

    for category in categories {
        if page_blacklist.contains(&category.source_url) {
            info!(
                "site {}: skipping blacklisted page {}",
                profile.name, category.source_url
            );
            continue;
        }

        let page_html = match fetcher.fetch(&category.source_url).await {
            Ok(html) => html,
            Err(err) => {
                warn!(
                    "site {}: category page {} failed: {err}",
                    profile.name, category.source_url
                );
                continue;
            }
        };

        for record in normalize::gather_raw_records(&page_html, &selectors, &profile) {
            let raw = match record {
                Ok(raw) => raw,
                Err(err) => {
                    warn!("site {}: record skipped: {err}", profile.name);
                    outcome.skipped_records += 1;
                    continue;
                }
            };
            let candidate = match normalize::normalize(
                raw,
                profile.timezone,
                category.clone(),
                site_location.clone(),
                chrono::Utc::now(),
            ) {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!("site {}: record skipped: {err}", profile.name);
                    outcome.skipped_records += 1;
                    continue;
                }
            };

            match reconciler.commit(store.as_ref(), candidate).await {
                Ok(ReconcileOutcome::Inserted) => outcome.inserted += 1,
                Ok(ReconcileOutcome::Updated(_)) => outcome.updated += 1,
                Ok(ReconcileOutcome::Unchanged) => outcome.unchanged += 1,
                Err(err) => {
                    warn!("site {}: reconcile failed: {err}", profile.name);
                    outcome.failed_records += 1;
                }
            }
        }
    }

    outcome
}

fn load_blacklists(
    store: &dyn CatalogStore,
) -> Result<(HashSet<String>, HashSet<String>), StoreError> {
    Ok((
        store.blacklisted_category_names()?,
        store.blacklisted_pages()?,
    ))
}

// Html is not Send, so parsing stays inside these synchronous helpers and
// never straddles an await point.
fn resolve_page_categories(
    html: &str,
    selectors: &SiteSelectors,
    profile: &SiteProfile,
    blacklist: &HashSet<String>,
) -> Vec<Category> {
    let document = Html::parse_document(html);
    categories::resolve_categories(
        &document,
        &selectors.category_link,
        &profile.base_url,
        blacklist,
    )
}

async fn fetch_location(
    fetcher: &dyn PageFetcher,
    selectors: &SiteSelectors,
    profile: &SiteProfile,
) -> Location {
    match fetcher.fetch(&profile.location_page).await {
        Ok(html) => {
            let document = Html::parse_document(&html);
            location::extract_location(
                &document,
                &selectors.full_location_path,
                &profile.location_name,
            )
        }
        Err(err) => {
            // Location failure is scoped to the fields, not the site.
            warn!("site {}: location page failed: {err}", profile.name);
            Location::new(profile.location_name.clone(), "", "", "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSelectors;
    use crate::error::FetchError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn profile(name: &str, base: &str) -> SiteProfile {
        SiteProfile {
            name: name.into(),
            base_url: base.into(),
            category_page: format!("{base}/categories"),
            location_page: format!("{base}/about"),
            location_name: "Venue Hall".into(),
            timezone: chrono_tz::Europe::Sofia,
            selectors: FieldSelectors {
                title: "div.card a.title".into(),
                date: "div.card span.date".into(),
                price: "div.card span.price".into(),
                image: "div.card img".into(),
                ticket_link: "div.card a.tickets".into(),
                category_link: "nav a.cat".into(),
                full_location_path: "div.address p".into(),
            },
        }
    }

    const CATEGORY_PAGE: &str = r#"
    <nav>
        <a class="cat" href="/music">Music</a>
        <a class="cat" href="/archive">Archive</a>
    </nav>
    "#;

    const ABOUT_PAGE: &str = r#"
    <div class="address"><p>1 Main Street</p><p>Sofia</p><p>Bulgaria</p></div>
    "#;

    const MUSIC_PAGE: &str = r#"
    <div class="card">
        <a class="title" href="/shows/jazz-night">Jazz Night</a>
        <span class="date">04.10.2026</span>
        <span class="price">10,00 lv</span>
    </div>
    <div class="card">
        <a class="title" href="/shows/broken">Broken Listing</a>
        <span class="date">05.10.2026</span>
        <span class="price">call the office</span>
    </div>
    "#;

    const ARCHIVE_PAGE: &str = r#"
    <div class="card">
        <a class="title" href="/shows/film-week">Film Week</a>
        <span class="date">10.10.2026</span>
        <span class="price">5 lv</span>
    </div>
    "#;

    fn fake_site(base: &str) -> FakeFetcher {
        let mut pages = HashMap::new();
        pages.insert(format!("{base}/categories"), CATEGORY_PAGE.to_string());
        pages.insert(format!("{base}/about"), ABOUT_PAGE.to_string());
        pages.insert(format!("{base}/music"), MUSIC_PAGE.to_string());
        pages.insert(format!("{base}/archive"), ARCHIVE_PAGE.to_string());
        FakeFetcher { pages }
    }

    #[tokio::test]
    async fn crawl_inserts_events_and_skips_broken_records() {
        let base = "https://venue.example";
        let store = Arc::new(MemoryStore::new());
        store
            .add_blacklisted_category_name("Archive")
            .expect("seed blacklist");
        let crawler = Crawler::new(
            Arc::new(fake_site(base)),
            store.clone(),
            DEFAULT_SITE_TIMEOUT,
        );

        let summary = crawler.run_all(&[profile("venue", base)]).await;
        assert_eq!(summary.sites.len(), 1);
        let outcome = &summary.sites[0];
        assert!(outcome.error.is_none());
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped_records, 1);

        let event = store
            .event_by_source_url("https://venue.example/shows/jazz-night")
            .expect("lookup")
            .expect("present");
        assert_eq!(event.title, "Jazz Night");
        assert_eq!(event.price, 10.0);
        assert_eq!(event.category.name, "Music");
        assert_eq!(event.location.city, "Sofia");

        // Blacklisted category never reached the catalog.
        let names: Vec<String> = store
            .categories()
            .expect("categories")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Music".to_string()]);
    }

    #[tokio::test]
    async fn second_crawl_of_identical_pages_is_all_noops() {
        let base = "https://venue.example";
        let store = Arc::new(MemoryStore::new());
        let crawler = Crawler::new(
            Arc::new(fake_site(base)),
            store.clone(),
            DEFAULT_SITE_TIMEOUT,
        );

        crawler.run_all(&[profile("venue", base)]).await;
        let summary = crawler.run_all(&[profile("venue", base)]).await;
        let outcome = &summary.sites[0];
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.updated, 0);
        assert!(outcome.unchanged >= 1);
    }

    #[tokio::test]
    async fn one_failing_site_does_not_affect_the_other() {
        let good = "https://venue.example";
        let store = Arc::new(MemoryStore::new());
        let crawler = Crawler::new(
            Arc::new(fake_site(good)),
            store.clone(),
            DEFAULT_SITE_TIMEOUT,
        );

        let summary = crawler
            .run_all(&[
                profile("venue", good),
                profile("offline", "https://offline.example"),
            ])
            .await;
        assert_eq!(summary.sites.len(), 2);
        assert!(summary.sites[0].error.is_none());
        assert!(summary.sites[0].inserted > 0);
        assert!(summary.sites[1].error.is_some());
        assert_eq!(summary.failed_sites(), 1);
    }

    #[tokio::test]
    async fn blacklisted_pages_are_never_crawled() {
        let base = "https://venue.example";
        let store = Arc::new(MemoryStore::new());
        store
            .add_blacklisted_page("https://venue.example/archive")
            .expect("seed blacklist");
        let crawler = Crawler::new(
            Arc::new(fake_site(base)),
            store.clone(),
            DEFAULT_SITE_TIMEOUT,
        );

        let summary = crawler.run_all(&[profile("venue", base)]).await;
        let outcome = &summary.sites[0];
        // Archive page holds the same two listings; only the music page
        // contributed records.
        assert_eq!(outcome.inserted + outcome.unchanged, 1);
    }
}
