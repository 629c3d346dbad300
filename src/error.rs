use thiserror::Error;

/// Network or protocol failure while fetching a page. The whole site is
/// skipped for the current crawl cycle; other sites are unaffected.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request timed out for {url}")]
    Timeout { url: String },
    #[error("http status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },
}

/// A single record could not be extracted or normalized. Scoped to that
/// record only; the rest of the page keeps processing.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("selector {selector:?} matched nothing at {source_url}")]
    MissingField {
        selector: String,
        source_url: String,
    },
    #[error("unparseable price {text:?} at {source_url}")]
    Price { text: String, source_url: String },
    #[error("unparseable date {text:?} at {source_url}")]
    Date { text: String, source_url: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The stored event changed between read and write. The reconciliation
    /// engine retries once against a re-read event before giving up.
    #[error("concurrent modification of event {event_id}")]
    Conflict { event_id: String },
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Site-level failure reported in the crawl summary.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid selector {selector:?} for site {site}: {message}")]
    BadSelector {
        site: String,
        selector: String,
        message: String,
    },
    #[error("site crawl timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}
