//! HTML→Markdown conversion (4.I). A thin, pure-function wrapper: the
//! engine owns resolution and scheme-skipping, this module only converts.

/// Convert an HTML document string to Markdown.
#[must_use]
pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_basic_heading_and_link() {
        let md = html_to_markdown("<h1>Title</h1><p><a href=\"/a\">link</a></p>");
        assert!(md.contains("Title"));
        assert!(md.contains("link"));
    }
}
