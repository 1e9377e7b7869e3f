//! Key→bytes disk sink (4.H). Write failures are logged and swallowed;
//! nothing here is allowed to take down the crawl.

use std::path::Path;

use tracing::{error, info};

/// Write `bytes` to `<base_dir>/<key>`, creating any missing parent
/// directories. `is_binary` only affects whether the bytes are treated as
/// already-encoded text for logging purposes; the write itself is always
/// a raw byte write.
pub async fn save(base_dir: &Path, key: &str, bytes: &[u8], is_binary: bool) {
    let path = base_dir.join(key);
    let Some(parent) = path.parent() else {
        error!(key, "output path has no parent directory");
        return;
    };
    if let Err(e) = tokio::fs::create_dir_all(parent).await {
        error!(key, error = %e, "failed to create output directory");
        return;
    }
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => info!(
            path = %path.display(),
            bytes = bytes.len(),
            binary = is_binary,
            "saved"
        ),
        Err(e) => error!(path = %path.display(), error = %e, "failed to write output file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn creates_nested_parents_and_writes_bytes() {
        let dir = tempdir().expect("tempdir");
        save(dir.path(), "host.com/a/b.md", b"# Hello", false).await;
        let content = tokio::fs::read(dir.path().join("host.com/a/b.md"))
            .await
            .expect("file written");
        assert_eq!(content, b"# Hello");
    }
}
