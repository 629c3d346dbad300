use scraper::{Html, Selector};

use crate::models::Location;
use crate::scraping::extract::select_texts;

/// Builds a location from the ordered node list the selector matches on a
/// location sub-page: index 0 is the address, 1 the city, 2 the country.
/// Trailing fields stay empty when fewer nodes match; zero nodes yield
/// all-empty fields. The positional contract is load-bearing and covered
/// by tests.
pub fn extract_location(document: &Html, selector: &Selector, name: &str) -> Location {
    let nodes = select_texts(document, selector);
    let field = |idx: usize| nodes.get(idx).cloned().unwrap_or_default();
    Location::new(name, field(0), field(1), field(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> Selector {
        Selector::parse("div.address p").expect("location selector")
    }

    #[test]
    fn fields_are_populated_positionally() {
        let html = r#"
        <div class="address">
            <p>1 Main Street</p>
            <p>Sofia</p>
            <p>Bulgaria</p>
            <p>extra ignored</p>
        </div>
        "#;
        let location = extract_location(&Html::parse_document(html), &selector(), "Venue Hall");
        assert_eq!(location.name, "Venue Hall");
        assert_eq!(location.address, "1 Main Street");
        assert_eq!(location.city, "Sofia");
        assert_eq!(location.country, "Bulgaria");
    }

    #[test]
    fn missing_trailing_nodes_leave_fields_empty() {
        let html = r#"<div class="address"><p>1 Main Street</p></div>"#;
        let location = extract_location(&Html::parse_document(html), &selector(), "Venue Hall");
        assert_eq!(location.address, "1 Main Street");
        assert_eq!(location.city, "");
        assert_eq!(location.country, "");
    }

    #[test]
    fn zero_nodes_yield_all_empty_fields() {
        let location =
            extract_location(&Html::parse_document("<div></div>"), &selector(), "Venue Hall");
        assert_eq!(location.address, "");
        assert_eq!(location.city, "");
        assert_eq!(location.country, "");
    }
}
