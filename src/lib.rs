//! Selector-driven event catalog scraper.
//!
//! Sites are described by [`config::SiteProfile`] records: a base URL plus
//! one selector expression per extracted field. A crawl cycle fetches each
//! site's category and listing pages, normalizes the raw strings into
//! canonical [`models::Event`] records, and reconciles them against the
//! stored catalog, appending a [`models::ChangedEvent`] per changed field.
//! The stored catalog is served through [`query::get_events`].

pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod query;
pub mod reconcile;
pub mod scraping;
pub mod store;
pub mod utils;

pub use config::{AppConfig, SiteProfile};
pub use error::{CrawlError, FetchError, RecordError, StoreError};
pub use fetch::{FetchSettings, PageFetcher, ReqwestFetcher};
pub use models::{Category, ChangedEvent, Event, Location};
pub use query::{EventFilter, EventPage, EventSearchParameters, TimeBucket};
pub use reconcile::{ReconcileAction, ReconcileOutcome, ReconciliationEngine};
pub use scraping::{CrawlSummary, Crawler, SiteOutcome};
pub use store::{CatalogStore, MemoryStore, SqliteStore};
