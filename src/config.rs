use std::{fs, path::Path};

use anyhow::Context;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One selector expression per extracted field, resolved against the
/// pages of a single site.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FieldSelectors {
    /// Matches the event detail anchor: text is the title, `href` is the
    /// event's source URL.
    pub title: String,
    pub date: String,
    pub price: String,
    pub image: String,
    pub ticket_link: String,
    pub category_link: String,
    /// Ordered node list on the location page: index 0 is the address,
    /// 1 the city, 2 the country.
    pub full_location_path: String,
}

/// Per-site crawl configuration. Authored externally; immutable during a
/// crawl cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,
    pub base_url: String,
    /// Page listing the category links.
    pub category_page: String,
    /// Page the location fields are read from.
    pub location_page: String,
    pub location_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    pub selectors: FieldSelectors,
}

fn default_timezone() -> Tz {
    chrono_tz::UTC
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sites: Vec<SiteProfile>,
    pub blacklisted_category_names: Vec<String>,
    pub blacklisted_pages: Vec<String>,
    /// Per-site crawl timeout in seconds.
    pub site_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .with_context(|| format!("unable to write config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrips_through_json() {
        let config = AppConfig {
            sites: vec![SiteProfile {
                name: "venue".into(),
                base_url: "https://venue.example".into(),
                category_page: "https://venue.example/categories".into(),
                location_page: "https://venue.example/about".into(),
                location_name: "Venue Hall".into(),
                timezone: chrono_tz::Europe::Sofia,
                selectors: FieldSelectors {
                    title: "div.card a.title".into(),
                    date: "div.card span.date".into(),
                    price: "div.card span.price".into(),
                    image: "div.card img".into(),
                    ticket_link: "div.card a.tickets".into(),
                    category_link: "nav a.category".into(),
                    full_location_path: "div.address p".into(),
                },
            }],
            blacklisted_category_names: vec!["Archive".into()],
            blacklisted_pages: vec!["https://venue.example/old".into()],
            site_timeout_secs: Some(60),
        };

        let json = serde_json::to_string(&config).expect("serialize config");
        let parsed: AppConfig = serde_json::from_str(&json).expect("parse config");
        assert_eq!(parsed.sites.len(), 1);
        assert_eq!(parsed.sites[0].timezone, chrono_tz::Europe::Sofia);
        assert_eq!(parsed.blacklisted_category_names, vec!["Archive"]);
    }

    #[test]
    fn missing_fields_default() {
        let parsed: AppConfig = serde_json::from_str("{}").expect("parse empty config");
        assert!(parsed.sites.is_empty());
        assert!(parsed.site_timeout_secs.is_none());
    }
}
