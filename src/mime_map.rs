//! MIME-type ↔ file-extension mapping for binary-document routing.

/// Downloadable binary MIME types the browser client will GET directly
/// instead of rendering, and the extension a successful response of that
/// content type is persisted under.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("application/vnd.ms-excel", ".xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
    ("application/vnd.ms-powerpoint", ".ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    ("text/csv", ".csv"),
    ("application/zip", ".zip"),
    ("application/x-tar", ".tar"),
    ("application/gzip", ".gz"),
    ("application/json", ".json"),
    ("application/xml", ".xml"),
    ("text/xml", ".xml"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/svg+xml", ".svg"),
    ("image/x-icon", ".ico"),
];

/// Extension a persisted binary response of `content_type` should use, or
/// `None` for text/html content (handled by the Markdown path instead).
/// `base_url` is consulted as a fallback when the content type is absent or
/// unrecognized, by checking the URL's own path extension.
#[must_use]
pub fn extension_for(content_type: &str, base_url: &str) -> Option<String> {
    let lowered = content_type.to_ascii_lowercase();
    let mime = lowered.split(';').next().unwrap_or("").trim();
    if let Some((_, ext)) = MIME_EXTENSIONS.iter().find(|(m, _)| *m == mime) {
        return Some((*ext).to_string());
    }
    if mime.starts_with("image/") {
        return Some(".jpg".to_string());
    }
    if mime.is_empty() || mime == "text/html" || mime.starts_with("text/plain") {
        return None;
    }
    // Fallback: an unrecognized non-text MIME type with a recognizable URL
    // extension is still treated as binary.
    let path_ext = base_url.rsplit('.').next().unwrap_or("");
    if !path_ext.is_empty() && path_ext.len() <= 5 && !path_ext.contains('/') {
        return Some(format!(".{}", path_ext.to_ascii_lowercase()));
    }
    None
}

/// Whether `content_type` denotes one of the direct-download binary MIME
/// types the browser client GETs instead of rendering.
#[must_use]
pub fn is_downloadable_binary(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    let mime = lowered.split(';').next().unwrap_or("").trim();
    mime.starts_with("image/") || MIME_EXTENSIONS.iter().any(|(m, _)| *m == mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_not_binary() {
        assert_eq!(extension_for("text/html; charset=utf-8", "https://a.com/"), None);
    }

    #[test]
    fn pdf_maps_to_extension() {
        assert_eq!(
            extension_for("application/pdf", "https://a.com/doc"),
            Some(".pdf".to_string())
        );
    }

    #[test]
    fn image_content_type_is_downloadable() {
        assert!(is_downloadable_binary("image/png"));
        assert!(!is_downloadable_binary("text/html"));
    }
}
