use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable hex id derived from the identity parts of an entity.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub source_url: String,
}

impl Category {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        let name = name.into();
        let source_url = source_url.into();
        Self {
            id: stable_id(&[&name, &source_url]),
            name,
            source_url,
        }
    }

    /// Identity key: two categories are the same iff name and URL agree.
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.source_url)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub country: String,
}

impl Location {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let address = address.into();
        let city = city.into();
        let country = country.into();
        Self {
            id: stable_id(&[&name, &address, &city, &country]),
            name,
            address,
            city,
            country,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    /// Stable hash of the source URL; two crawls of the same URL always
    /// resolve to the same event.
    pub id: String,
    pub source_url: String,
    pub title: String,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub image_link: Option<String>,
    pub price: f64,
    pub ticket_link: Option<String>,
    pub location: Location,
    pub category: Category,
    /// True once at least one reconciled change has been recorded.
    pub updated: bool,
    pub scraped_at: DateTime<Utc>,
}

impl Event {
    pub fn id_for_source_url(source_url: &str) -> String {
        stable_id(&[source_url])
    }
}

/// Append-only record of one field's old and new value; never mutated
/// after creation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChangedEvent {
    pub id: String,
    pub event_id: String,
    pub old_information: String,
    pub new_information: String,
    pub change_time: DateTime<Utc>,
}

impl ChangedEvent {
    pub fn new(
        event_id: &str,
        field: &str,
        old_value: &str,
        new_value: &str,
        change_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: stable_id(&[event_id, field, &change_time.to_rfc3339()]),
            event_id: event_id.to_string(),
            old_information: serialize_field(field, old_value),
            new_information: serialize_field(field, new_value),
            change_time,
        }
    }
}

/// Canonical `"<field>: <value>"` rendering used by change records.
pub fn serialize_field(field: &str, value: &str) -> String {
    format!("{field}: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_stable_per_source_url() {
        let a = Event::id_for_source_url("https://venue.example/shows/1");
        let b = Event::id_for_source_url("https://venue.example/shows/1");
        let c = Event::id_for_source_url("https://venue.example/shows/2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn category_identity_is_name_and_url() {
        let a = Category::new("Music", "https://venue.example/music");
        let b = Category::new("Music", "https://venue.example/music");
        let c = Category::new("Music", "https://other.example/music");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn changed_event_serializes_field_and_value() {
        let change = ChangedEvent::new("ev1", "price", "10", "12.5", Utc::now());
        assert_eq!(change.old_information, "price: 10");
        assert_eq!(change.new_information, "price: 12.5");
        assert_eq!(change.event_id, "ev1");
    }
}
