use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::Event;
use crate::store::CatalogStore;

/// Canonical page-size cap; requests above it are clamped, never rejected.
pub const MAX_PAGE_SIZE: u32 = 50;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    #[default]
    All,
    Upcoming,
    Past,
}

impl TimeBucket {
    fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::All => "all",
            TimeBucket::Upcoming => "upcoming",
            TimeBucket::Past => "past",
        }
    }
}

/// The three orthogonal filter clauses, ANDed in a single pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub bucket: TimeBucket,
    /// Exact category name match when present.
    pub category: Option<String>,
    /// Case-insensitive substring over title and location name.
    pub search: Option<String>,
}

impl EventFilter {
    fn matches(&self, event: &Event, today: DateTime<Utc>) -> bool {
        let bucket_ok = match self.bucket {
            TimeBucket::All => true,
            TimeBucket::Upcoming => event.date_start >= today,
            TimeBucket::Past => event.date_start < today,
        };
        let category_ok = self
            .category
            .as_deref()
            .map_or(true, |category| event.category.name == category);
        let search_ok = self.search.as_deref().map_or(true, |needle| {
            let needle = needle.to_lowercase();
            event.title.to_lowercase().contains(&needle)
                || event.location.name.to_lowercase().contains(&needle)
        });
        bucket_ok && category_ok && search_ok
    }
}

/// Paging input. Always valid by construction: page number is at least 1
/// and page size never exceeds [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSearchParameters {
    page_number: u32,
    page_size: u32,
}

impl Default for EventSearchParameters {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

impl EventSearchParameters {
    pub fn new(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number: page_number.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Flat pagination metadata returned next to the item payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub total_count: usize,
    pub page_size: u32,
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_page_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventPage {
    pub items: Vec<Event>,
    pub metadata: PageMetadata,
}

/// Filters, sorts, and pages the stored catalog in one pass. Sort order is
/// ascending by start date with ties broken by id, so identical inputs
/// always produce identical pages. Out-of-range pages return empty items
/// with the metadata still populated.
pub fn get_events(
    store: &dyn CatalogStore,
    filter: &EventFilter,
    params: EventSearchParameters,
    now: DateTime<Utc>,
) -> Result<EventPage, StoreError> {
    let today = start_of_day(now);

    let mut matched: Vec<Event> = store
        .events()?
        .into_iter()
        .filter(|event| filter.matches(event, today))
        .collect();
    matched.sort_by(|a, b| {
        a.date_start
            .cmp(&b.date_start)
            .then_with(|| a.id.cmp(&b.id))
    });

    let total_count = matched.len();
    let page_size = params.page_size();
    let current_page = params.page_number();
    let total_pages = (total_count as u32).div_ceil(page_size);

    let offset = (current_page - 1) as usize * page_size as usize;
    let items: Vec<Event> = matched
        .into_iter()
        .skip(offset)
        .take(page_size as usize)
        .collect();

    let previous_page_link = (current_page > 1)
        .then(|| page_link(filter, current_page - 1, page_size));
    let next_page_link = (current_page < total_pages)
        .then(|| page_link(filter, current_page + 1, page_size));

    Ok(EventPage {
        items,
        metadata: PageMetadata {
            total_count,
            page_size,
            current_page,
            total_pages,
            previous_page_link,
            next_page_link,
        },
    })
}

pub fn get_events_now(
    store: &dyn CatalogStore,
    filter: &EventFilter,
    params: EventSearchParameters,
) -> Result<EventPage, StoreError> {
    get_events(store, filter, params, Utc::now())
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

fn page_link(filter: &EventFilter, page: u32, page_size: u32) -> String {
    // Built through Url so query values get percent-encoded.
    let mut url = reqwest::Url::parse("https://catalog.invalid/events").expect("base link url");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("pageNumber", &page.to_string());
        pairs.append_pair("pageSize", &page_size.to_string());
        if filter.bucket != TimeBucket::All {
            pairs.append_pair("bucket", filter.bucket.as_str());
        }
        if let Some(category) = &filter.category {
            pairs.append_pair("category", category);
        }
        if let Some(search) = &filter.search {
            pairs.append_pair("search", search);
        }
    }
    format!("/events?{}", url.query().unwrap_or_default())
}
