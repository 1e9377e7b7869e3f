//! URL parsing, RFC-3986-ish relative resolution, and output-path derivation.

use url::Url;

use crate::constants::IMAGE_EXTENSIONS;

/// A parsed URL with every field the engine needs exposed directly, plus
/// the original input preserved for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    /// Port as a string (empty if default/unspecified), matching the
    /// spec's "port (string)" field.
    pub port: String,
    /// Never empty; an empty path becomes "/".
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
    pub raw: String,
}

/// Parse `url`, returning `None` for malformed input.
#[must_use]
pub fn parse(url: &str) -> Option<ParsedUrl> {
    let parsed = Url::parse(url).ok()?;
    let path = if parsed.path().is_empty() {
        "/".to_string()
    } else {
        parsed.path().to_string()
    };
    Some(ParsedUrl {
        scheme: parsed.scheme().to_string(),
        host: parsed.host_str().unwrap_or_default().to_string(),
        port: parsed.port().map(|p| p.to_string()).unwrap_or_default(),
        path,
        query: parsed.query().map(str::to_string),
        fragment: parsed.fragment().map(str::to_string),
        raw: url.to_string(),
    })
}

/// Resolve `relative` against `base`, RFC-3986-style. `mailto:` and
/// `javascript:` targets resolve to the empty string, signalling "skip".
#[must_use]
pub fn resolve(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    let lower = relative.trim_start();
    if lower.starts_with("mailto:") || lower.starts_with("javascript:") {
        return String::new();
    }
    let Ok(base_url) = Url::parse(base) else {
        return String::new();
    };
    match base_url.join(relative) {
        Ok(joined) => joined.to_string(),
        Err(_) => String::new(),
    }
}

fn host_port_of(s: &str) -> Option<(String, Option<u16>)> {
    if s.contains("://") {
        let url = Url::parse(s).ok()?;
        return Some((url.host_str()?.to_string(), url.port()));
    }
    // Bare "host" or "host:port" form, as used by callers comparing raw hosts.
    if let Some((host, port_str)) = s.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Some((host.to_string(), Some(port)));
        }
    }
    Some((s.to_string(), None))
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Compare two host-ish strings (bare hosts, `host:port`, or full URLs) for
/// domain equality, case-insensitively, ignoring port and one trailing dot.
#[must_use]
pub fn is_same_domain(a: &str, b: &str) -> bool {
    let Some((host_a, _)) = host_port_of(a) else {
        return false;
    };
    let Some((host_b, _)) = host_port_of(b) else {
        return false;
    };
    normalize_host(&host_a) == normalize_host(&host_b)
}

fn host_dir(parsed: &ParsedUrl) -> String {
    if parsed.port.is_empty() {
        parsed.host.clone()
    } else {
        format!("{}_{}", parsed.host, parsed.port)
    }
}

fn path_with_extension(path: &str, ext: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || path.ends_with('/') {
        return format!("{trimmed}index.{ext}").replace("//", "/");
    }
    match trimmed.rsplit_once('.') {
        Some((stem, e)) if !e.contains('/') && e != ext => format!("{stem}.{ext}"),
        Some((_, e)) if e == ext => trimmed.to_string(),
        _ => format!("{trimmed}.{ext}"),
    }
}

/// Tree-structured output path: `host[_port]/path[/index].md`.
#[must_use]
pub fn to_filename(url: &str) -> Option<String> {
    to_filename_with_ext(url, "md")
}

/// Flat output path: same shape as [`to_filename`] with `/` replaced by `_`.
#[must_use]
pub fn to_flat_filename(url: &str) -> Option<String> {
    to_flat_filename_with_ext(url, "md")
}

/// Tree-structured output path with an explicit final extension (no leading
/// dot), used for binary documents routed by content type instead of the
/// default Markdown rendition.
#[must_use]
pub fn to_filename_with_ext(url: &str, ext: &str) -> Option<String> {
    let parsed = parse(url)?;
    let rel = path_with_extension(&parsed.path, ext);
    Some(format!("{}/{}", host_dir(&parsed), rel))
}

/// Flat-mode counterpart to [`to_filename_with_ext`].
#[must_use]
pub fn to_flat_filename_with_ext(url: &str, ext: &str) -> Option<String> {
    let parsed = parse(url)?;
    let rel = path_with_extension(&parsed.path, ext);
    Some(format!("{}_{}", host_dir(&parsed), rel.replace('/', "_")))
}

/// Whether the URL's path suffix matches a known image extension,
/// case-insensitively.
#[must_use]
pub fn is_image(url: &str) -> bool {
    let Some(parsed) = parse(url) else {
        return false;
    };
    let lower = parsed.path.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_empty_path_to_slash() {
        let parsed = parse("https://example.com").expect("valid url");
        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.host, "example.com");
    }

    #[test]
    fn resolve_empty_is_identity() {
        assert_eq!(resolve("https://a.com/x", ""), "https://a.com/x");
    }

    #[test]
    fn resolve_fragment_only_replaces_fragment() {
        assert_eq!(
            resolve("https://a.com/x?q=1", "#f"),
            "https://a.com/x?q=1#f"
        );
    }

    #[test]
    fn resolve_query_only_replaces_query() {
        assert_eq!(resolve("https://a.com/x#f", "?q"), "https://a.com/x?q");
    }

    #[test]
    fn resolve_absolute_overrides_base() {
        assert_eq!(
            resolve("https://a.com/x", "https://b.com/y"),
            "https://b.com/y"
        );
    }

    #[test]
    fn resolve_dotdot_never_escapes_root() {
        assert_eq!(
            resolve("https://a.com/x/y", "../../../../z"),
            "https://a.com/z"
        );
    }

    #[test]
    fn resolve_mailto_and_javascript_skip() {
        assert_eq!(resolve("https://a.com/x", "mailto:me@a.com"), "");
        assert_eq!(resolve("https://a.com/x", "javascript:void(0)"), "");
    }

    #[test]
    fn resolve_protocol_relative() {
        assert_eq!(
            resolve("https://a.com/x", "//b.com/p"),
            "https://b.com/p"
        );
    }

    #[test]
    fn same_domain_ignores_scheme_and_trailing_dot() {
        assert!(is_same_domain("https://example.com", "http://example.com."));
    }

    #[test]
    fn same_domain_ignores_port_mismatch_form() {
        assert!(is_same_domain("example.com", "example.com:443"));
    }

    #[test]
    fn filename_tree_mode_index_for_trailing_slash() {
        assert_eq!(
            to_filename("https://example.com/docs/").unwrap(),
            "example.com/docs/index.md"
        );
    }

    #[test]
    fn filename_replaces_non_md_extension() {
        assert_eq!(
            to_filename("https://example.com/a/b.html").unwrap(),
            "example.com/a/b.md"
        );
    }

    #[test]
    fn filename_includes_nonstandard_port() {
        assert_eq!(
            to_filename("https://example.com:8080/a").unwrap(),
            "example.com_8080/a.md"
        );
    }

    #[test]
    fn flat_filename_flattens_path_separators() {
        assert_eq!(
            to_flat_filename("https://example.com/a/b/c").unwrap(),
            "example.com_a_b_c.md"
        );
    }

    #[test]
    fn is_image_matches_closed_set_case_insensitively() {
        assert!(is_image("https://example.com/logo.PNG"));
        assert!(!is_image("https://example.com/page.html"));
    }
}
