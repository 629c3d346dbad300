use scraper::{ElementRef, Html, Selector};

use crate::config::{FieldSelectors, SiteProfile};
use crate::error::CrawlError;

/// Selector expressions compiled once per site before the crawl touches
/// any page.
pub struct SiteSelectors {
    pub title: Selector,
    pub date: Selector,
    pub price: Selector,
    pub image: Selector,
    pub ticket_link: Selector,
    pub category_link: Selector,
    pub full_location_path: Selector,
}

impl SiteSelectors {
    pub fn compile(profile: &SiteProfile) -> Result<Self, CrawlError> {
        let FieldSelectors {
            title,
            date,
            price,
            image,
            ticket_link,
            category_link,
            full_location_path,
        } = &profile.selectors;
        Ok(Self {
            title: compile_one(&profile.name, title)?,
            date: compile_one(&profile.name, date)?,
            price: compile_one(&profile.name, price)?,
            image: compile_one(&profile.name, image)?,
            ticket_link: compile_one(&profile.name, ticket_link)?,
            category_link: compile_one(&profile.name, category_link)?,
            full_location_path: compile_one(&profile.name, full_location_path)?,
        })
    }
}

fn compile_one(site: &str, expr: &str) -> Result<Selector, CrawlError> {
    Selector::parse(expr).map_err(|err| CrawlError::BadSelector {
        site: site.to_string(),
        selector: expr.to_string(),
        message: err.to_string(),
    })
}

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// Ordered text of every node the selector matches; empty when nothing
/// matches, never an error.
pub fn select_texts(document: &Html, selector: &Selector) -> Vec<String> {
    document.select(selector).map(inner_text).collect()
}

/// Ordered attribute values, one entry per matched node so positions stay
/// aligned with `select_texts` over the same selector.
pub fn select_attrs(document: &Html, selector: &Selector, attr: &str) -> Vec<Option<String>> {
    document
        .select(selector)
        .map(|el| el.value().attr(attr).map(str::to_string))
        .collect()
}

/// Ordered (text, attribute) pairs per matched node.
pub fn select_text_attr_pairs(
    document: &Html,
    selector: &Selector,
    attr: &str,
) -> Vec<(String, Option<String>)> {
    document
        .select(selector)
        .map(|el| (inner_text(el), el.value().attr(attr).map(str::to_string)))
        .collect()
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
    <ul>
        <li class="item"><a href="/a">  First   item </a></li>
        <li class="item"><a href="/b">Second item</a></li>
        <li class="item"><span>No link here</span></li>
    </ul>
    "#;

    #[test]
    fn select_texts_returns_ordered_cleaned_values() {
        let document = Html::parse_document(SAMPLE_HTML);
        let selector = Selector::parse("li.item").expect("item selector");
        let texts = select_texts(&document, &selector);
        assert_eq!(texts, vec!["First item", "Second item", "No link here"]);
    }

    #[test]
    fn select_texts_is_empty_when_nothing_matches() {
        let document = Html::parse_document(SAMPLE_HTML);
        let selector = Selector::parse("div.absent").expect("absent selector");
        assert!(select_texts(&document, &selector).is_empty());
    }

    #[test]
    fn attr_positions_stay_aligned_with_texts() {
        let document = Html::parse_document(SAMPLE_HTML);
        let selector = Selector::parse("li.item a, li.item span").expect("selector");
        let pairs = select_text_attr_pairs(&document, &selector, "href");
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("First item".to_string(), Some("/a".to_string())));
        assert_eq!(pairs[2].1, None);
    }

    #[test]
    fn absolute_url_joins_relative_targets() {
        assert_eq!(
            absolute_url("https://venue.example/shows/", Some("/tickets/1".to_string())),
            Some("https://venue.example/tickets/1".to_string())
        );
        assert_eq!(
            absolute_url(
                "https://venue.example/",
                Some("https://other.example/x".to_string())
            ),
            Some("https://other.example/x".to_string())
        );
        assert_eq!(absolute_url("https://venue.example/", None), None);
    }
}
