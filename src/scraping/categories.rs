use std::collections::HashSet;

use scraper::{Html, Selector};

use crate::models::Category;
use crate::scraping::extract::inner_text;

/// Resolves category candidates from a category-listing page.
///
/// Link targets that do not already contain the site's base URL are
/// prefixed with it. Candidates whose trimmed name is blacklisted are
/// dropped; the rest are deduplicated on (name, url) in first-seen order.
/// A whitespace-only label normalizes to the empty string and goes through
/// the same blacklist and dedup rules as any other name.
pub fn resolve_categories(
    document: &Html,
    selector: &Selector,
    base_url: &str,
    blacklist: &HashSet<String>,
) -> Vec<Category> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut categories = Vec::new();

    for node in document.select(selector) {
        let name = inner_text(node);
        let target = node.value().attr("href").unwrap_or_default();
        let url = if target.contains(base_url) {
            target.to_string()
        } else {
            format!("{base_url}{target}")
        };

        if blacklist.contains(&name) {
            continue;
        }
        if seen.insert((name.clone(), url.clone())) {
            categories.push(Category::new(name, url));
        }
    }

    categories
}
