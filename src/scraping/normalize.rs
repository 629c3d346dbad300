use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

use crate::config::SiteProfile;
use crate::error::RecordError;
use crate::models::{Category, Event, Location};
use crate::scraping::extract::{
    absolute_url, select_attrs, select_text_attr_pairs, select_texts, SiteSelectors,
};

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid price regex"));
static RANGE_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[-–—]\s+|–").expect("valid range regex"));

/// Per-field raw strings for one listing, zipped positionally from the
/// field value lists of a category page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub source_url: String,
    pub title: String,
    pub date_text: String,
    pub price_text: String,
    pub image_link: Option<String>,
    pub ticket_link: Option<String>,
}

/// Extracts the raw records of a category page. The title selector drives
/// the record count; a missing date or price at some position is a
/// record-scoped error so one broken listing never hides the rest.
pub fn gather_raw_records(
    html: &str,
    selectors: &SiteSelectors,
    profile: &SiteProfile,
) -> Vec<Result<RawEvent, RecordError>> {
    let document = Html::parse_document(html);

    let titles = select_text_attr_pairs(&document, &selectors.title, "href");
    let dates = select_texts(&document, &selectors.date);
    let prices = select_texts(&document, &selectors.price);
    let images = select_attrs(&document, &selectors.image, "src");
    let tickets = select_attrs(&document, &selectors.ticket_link, "href");

    let mut records = Vec::with_capacity(titles.len());
    for (idx, (title, href)) in titles.into_iter().enumerate() {
        let source_url = match absolute_url(&profile.base_url, href) {
            Some(url) => url,
            None => {
                records.push(Err(RecordError::MissingField {
                    selector: profile.selectors.title.clone(),
                    source_url: profile.base_url.clone(),
                }));
                continue;
            }
        };
        let date_text = match dates.get(idx) {
            Some(text) => text.clone(),
            None => {
                records.push(Err(RecordError::MissingField {
                    selector: profile.selectors.date.clone(),
                    source_url,
                }));
                continue;
            }
        };
        let price_text = match prices.get(idx) {
            Some(text) => text.clone(),
            None => {
                records.push(Err(RecordError::MissingField {
                    selector: profile.selectors.price.clone(),
                    source_url,
                }));
                continue;
            }
        };
        let image_link = images
            .get(idx)
            .cloned()
            .flatten()
            .and_then(|src| absolute_url(&profile.base_url, Some(src)));
        let ticket_link = tickets
            .get(idx)
            .cloned()
            .flatten()
            .and_then(|href| absolute_url(&profile.base_url, Some(href)));

        records.push(Ok(RawEvent {
            source_url,
            title,
            date_text,
            price_text,
            image_link,
            ticket_link,
        }));
    }
    records
}

/// Turns a raw record into a canonical event candidate, attaching the
/// already-resolved category and location for the page.
pub fn normalize(
    raw: RawEvent,
    timezone: Tz,
    category: Category,
    location: Location,
    now: DateTime<Utc>,
) -> Result<Event, RecordError> {
    let price = parse_price(&raw.price_text).ok_or_else(|| RecordError::Price {
        text: raw.price_text.clone(),
        source_url: raw.source_url.clone(),
    })?;
    let (date_start, date_end) =
        parse_date_range(&raw.date_text, timezone).ok_or_else(|| RecordError::Date {
            text: raw.date_text.clone(),
            source_url: raw.source_url.clone(),
        })?;

    Ok(Event {
        id: Event::id_for_source_url(&raw.source_url),
        source_url: raw.source_url,
        title: raw.title.trim().to_string(),
        date_start,
        date_end,
        image_link: raw.image_link,
        price,
        ticket_link: raw.ticket_link,
        location,
        category,
        updated: false,
        scraped_at: now,
    })
}

/// Locale-tolerant price parsing: the first numeric token wins, with
/// either `.` or `,` accepted as the decimal separator and the other one
/// treated as a thousands separator. "Free" admission parses as zero.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }
    let lower = cleaned.to_lowercase();
    if lower.contains("free") || lower.contains("безплатно") {
        return Some(0.0);
    }

    let token = PRICE_RE.find(cleaned)?.as_str();
    normalize_number(token).parse::<f64>().ok()
}

fn normalize_number(token: &str) -> String {
    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');
    match (last_dot, last_comma) {
        // Both present: the rightmost separator is the decimal one.
        (Some(dot), Some(comma)) if dot > comma => {
            token.chars().filter(|&c| c != ',').collect()
        }
        (Some(_), Some(_)) => token
            .chars()
            .filter(|&c| c != '.')
            .map(|c| if c == ',' { '.' } else { c })
            .collect(),
        (None, Some(comma)) => {
            // A lone comma is decimal when followed by at most two digits,
            // otherwise it groups thousands.
            if token.len() - comma - 1 <= 2 {
                token.replacen(',', ".", 1)
            } else {
                token.chars().filter(|&c| c != ',').collect()
            }
        }
        _ => token.to_string(),
    }
}

/// Parses "start - end" or a single date, resolving page-local midnight in
/// the site's timezone. A missing end date defaults to the start.
pub fn parse_date_range(text: &str, tz: Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }

    let mut parts = RANGE_SPLIT_RE.splitn(cleaned, 2);
    let start_text = parts.next()?.trim();
    let end_text = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let start = parse_local_date(start_text, tz)?;
    let end = match end_text {
        Some(text) => parse_local_date(text, tz)?,
        None => start,
    };
    Some((start, end))
}

fn parse_local_date(input: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let date = parse_naive_date(input)?;
    let naive = NaiveDateTime::new(date, NaiveTime::MIN);
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => return None,
    };
    Some(local.with_timezone(&Utc))
}

fn parse_naive_date(input: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 9] = [
        "%Y-%m-%d",
        "%d.%m.%Y",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %B %Y",
        "%d %b %Y",
        "%A, %d %B %Y",
    ];
    for fmt in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return Some(date);
        }
    }
    None
}
