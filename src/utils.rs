//! Utility functions for path layout, file fingerprints, and settle checks

use crate::error::{Error, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Build the date partition directory under the download root
///
/// # Examples
///
/// ```
/// use papers_dl::utils::date_dir;
/// use chrono::NaiveDate;
/// use std::path::Path;
///
/// let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
/// let dir = date_dir(Path::new("/data/downloaded_papers"), date);
/// assert_eq!(dir, Path::new("/data/downloaded_papers/2025-06-01"));
/// ```
pub fn date_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format("%Y-%m-%d").to_string())
}

/// Build the destination path for one paper: `<root>/YYYY-MM-DD/<id>.pdf`
///
/// The id is sanitized so it cannot escape the partition directory or
/// produce an invalid filename.
pub fn destination_for(root: &Path, date: NaiveDate, id: &str) -> PathBuf {
    date_dir(root, date).join(format!("{}.pdf", sanitize_id(id)))
}

/// Replace path separators and other unsafe characters in a paper id
///
/// Keeps alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Check whether a path has the `.pdf` extension (case-insensitive)
pub fn is_pdf_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Compute the SHA-256 fingerprint of a file's contents as a hex string
///
/// Used as the processed-files key together with the absolute path, so a
/// re-downloaded file with different contents counts as a new arrival.
pub async fn file_fingerprint(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(Error::Io)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Wait until a file's size is stable across one settle interval
///
/// Polls the file size, sleeping `settle_interval` between reads, until two
/// consecutive reads agree on a non-zero size. Returns the settled size, or
/// `None` if the file kept changing for `max_checks` reads or disappeared.
///
/// This is the guard that keeps the watcher from handing a partially-written
/// file to the dispatcher.
pub async fn wait_until_settled(
    path: &Path,
    settle_interval: Duration,
    max_checks: u32,
) -> Option<u64> {
    let mut last_size: Option<u64> = None;

    for _ in 0..max_checks {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            // File vanished (moved or deleted mid-write)
            Err(_) => return None,
        };

        if size > 0 && last_size == Some(size) {
            return Some(size);
        }

        last_size = Some(size);
        tokio::time::sleep(settle_interval).await;
    }

    None
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn destination_layout_matches_contract() {
        let dest = destination_for(Path::new("downloaded_papers"), date(), "2401.12345");
        assert_eq!(
            dest,
            Path::new("downloaded_papers/2025-06-01/2401.12345.pdf")
        );
    }

    #[test]
    fn sanitize_id_strips_separators() {
        assert_eq!(sanitize_id("hep-th/9901001"), "hep-th_9901001");
        assert_eq!(sanitize_id("2401.12345"), "2401.12345");
        assert_eq!(sanitize_id("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn pdf_extension_detection() {
        assert!(is_pdf_file(Path::new("a.pdf")));
        assert!(is_pdf_file(Path::new("a.PDF")));
        assert!(!is_pdf_file(Path::new("a.pdf.part")));
        assert!(!is_pdf_file(Path::new("a.txt")));
        assert!(!is_pdf_file(Path::new("a")));
    }

    #[tokio::test]
    async fn fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.pdf");

        tokio::fs::write(&path, b"one").await.unwrap();
        let fp1 = file_fingerprint(&path).await.unwrap();

        tokio::fs::write(&path, b"two").await.unwrap();
        let fp2 = file_fingerprint(&path).await.unwrap();

        assert_ne!(fp1, fp2);
        assert_eq!(fp1.len(), 64, "sha256 hex digest");
    }

    #[tokio::test]
    async fn settle_returns_size_once_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stable.pdf");
        tokio::fs::write(&path, b"full contents").await.unwrap();

        let size = wait_until_settled(&path, Duration::from_millis(20), 10).await;
        assert_eq!(size, Some(13));
    }

    #[tokio::test]
    async fn settle_gives_up_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never-created.pdf");

        let size = wait_until_settled(&path, Duration::from_millis(10), 3).await;
        assert_eq!(size, None);
    }

    #[tokio::test]
    async fn settle_waits_out_a_slow_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slow.pdf");
        tokio::fs::write(&path, b"12").await.unwrap();

        // Writer keeps appending in bursts much shorter than the settle
        // interval, then stops
        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let mut existing = tokio::fs::read(&writer_path).await.unwrap();
                existing.extend_from_slice(b"34");
                tokio::fs::write(&writer_path, existing).await.unwrap();
            }
        });

        let size = wait_until_settled(&path, Duration::from_millis(60), 40).await;
        writer.await.unwrap();

        // Settled size must be the final size, never an intermediate one
        assert_eq!(size, Some(12));
    }
}
