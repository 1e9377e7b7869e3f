//! Link extraction (4.I): collect every `<a href="...">` attribute value
//! verbatim. Resolution and scheme-skipping are the engine's job.

use scraper::{Html, Selector};

/// Extract every `href` attribute from `<a>` tags in `html`, in document
/// order. Empty strings are included; callers filter.
#[must_use]
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a").expect("'a' is a valid CSS selector");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .collect()
}
