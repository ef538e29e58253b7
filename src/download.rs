use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ReportError, Result};
use crate::segment::assign::Assignment;
use crate::segment::items::{file_name, AssetName};
use crate::session::ImageFetcher;

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Written { bytes: usize },
    SkippedExisting,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub index: usize,
    pub asset: AssetName,
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Sidecar describing one downloaded report.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub title: String,
    pub url: String,
    pub images: usize,
    pub sections: BTreeMap<AssetName, usize>,
}

impl Metadata {
    pub fn new(title: &str, url: &str, assignment: &Assignment) -> Self {
        Metadata {
            title: title.to_string(),
            url: url.to_string(),
            images: assignment.len(),
            sections: assignment.counts(),
        }
    }
}

/// `{index:02}.{ext}`; webp is served re-encoded as png.
pub fn target_file_name(index: usize, src: &str) -> String {
    let name = file_name(src);
    let ext = Path::new(&name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "png".to_string());
    let ext = if ext == "webp" { "png".to_string() } else { ext };
    format!("{:02}.{}", index, ext)
}

/// Reject bodies that are not a recognizable image, such as a login page
/// served in place of the file.
pub fn decode_image(url: &str, bytes: &[u8]) -> Result<image::ImageFormat> {
    if bytes.is_empty() {
        return Err(ReportError::DecodeFailed {
            url: url.to_string(),
            reason: "empty body".to_string(),
        });
    }
    image::guess_format(bytes).map_err(|e| ReportError::DecodeFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Write to a sibling `.part` file, then rename over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Download every image into `report_dir/{asset}/`, in index order.
///
/// Files already on disk are left alone and not fetched again. A failed
/// image is recorded and the loop moves on.
pub async fn download_all<F: ImageFetcher>(
    fetcher: &F,
    report_dir: &Path,
    images: &[(usize, &str)],
    assignment: &Assignment,
) -> Vec<DownloadRecord> {
    let pb = ProgressBar::new(images.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let mut records = Vec::with_capacity(images.len());
    for &(index, src) in images {
        let asset = assignment.get(index);
        let folder = report_dir.join(asset.as_str());
        let filename = target_file_name(index, src);
        let path = folder.join(&filename);

        let outcome = match download_one(fetcher, src, &folder, &path).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(e.to_string()),
        };
        match &outcome {
            Outcome::Written { bytes } => info!("{}/{} ({}KB)", asset, filename, bytes / 1024),
            Outcome::SkippedExisting => info!("Skip {}/{} (exists)", asset, filename),
            Outcome::Failed(reason) => warn!("FAILED {}/{}: {}", asset, filename, reason),
        }

        records.push(DownloadRecord {
            index,
            asset,
            path,
            outcome,
        });
        pb.inc(1);
    }
    pb.finish_and_clear();
    records
}

async fn download_one<F: ImageFetcher>(
    fetcher: &F,
    src: &str,
    folder: &Path,
    path: &Path,
) -> Result<Outcome> {
    tokio::fs::create_dir_all(folder).await?;
    if tokio::fs::try_exists(path).await? {
        return Ok(Outcome::SkippedExisting);
    }
    let bytes = fetcher.fetch(src).await?;
    decode_image(src, &bytes)?;
    write_atomic(path, &bytes).await?;
    Ok(Outcome::Written { bytes: bytes.len() })
}

/// Write `metadata.json` into `report_dir`.
pub async fn write_metadata(report_dir: &Path, metadata: &Metadata) -> Result<PathBuf> {
    let path = report_dir.join(METADATA_FILE);
    let json = serde_json::to_string_pretty(metadata)?;
    write_atomic(&path, json.as_bytes()).await?;
    Ok(path)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use super::*;
    use crate::segment::assign;
    use crate::segment::partition::Section;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[derive(Default)]
    struct FakeFetcher {
        failing: HashSet<String>,
        body: Option<Vec<u8>>,
        calls: RefCell<Vec<String>>,
    }

    impl ImageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.borrow_mut().push(url.to_string());
            if self.failing.contains(url) {
                return Err(ReportError::FetchFailed {
                    url: url.to_string(),
                    reason: "HTTP 503".into(),
                });
            }
            Ok(self.body.clone().unwrap_or_else(|| PNG.to_vec()))
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("https://s/wp-content/uploads/2025/02/img-{}.webp", i))
            .collect()
    }

    fn pairs(urls: &[String]) -> Vec<(usize, &str)> {
        urls.iter().enumerate().map(|(i, u)| (i, u.as_str())).collect()
    }

    fn assignment(total: usize) -> Assignment {
        let sections = vec![
            Section { asset: AssetName::Sp500, start: 1, end: 3 },
            Section { asset: AssetName::Bitcoin, start: 3, end: 4 },
            Section { asset: AssetName::Eurusd, start: 4, end: 5 },
            Section { asset: AssetName::Gold, start: 5, end: 6 },
            Section { asset: AssetName::Oil, start: 6, end: 7 },
        ];
        assign::resolve(total, 7, &sections)
    }

    #[test]
    fn file_names() {
        assert_eq!(target_file_name(3, "https://s/a/b-1.webp?x=1"), "03.png");
        assert_eq!(target_file_name(3, "https://s/a/CHART.JPG"), "03.jpg");
        assert_eq!(target_file_name(12, "https://s/a/no-extension"), "12.png");
        assert_eq!(target_file_name(123, "https://s/a/x.gif#frag"), "123.gif");
        assert_eq!(target_file_name(0, "https://s/a/%D7%93%D7%95%D7%97.jpeg"), "00.jpeg");
    }

    #[test]
    fn decode_rejects_html_and_empty() {
        assert!(decode_image("u", PNG).is_ok());
        assert!(matches!(
            decode_image("u", b"<!DOCTYPE html><html>"),
            Err(ReportError::DecodeFailed { .. })
        ));
        assert!(matches!(decode_image("u", b""), Err(ReportError::DecodeFailed { .. })));
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let urls = urls(9);
        let images = pairs(&urls);
        let a = assignment(9);
        let fetcher = FakeFetcher::default();

        let first = download_all(&fetcher, dir.path(), &images, &a).await;
        assert!(first.iter().all(|r| matches!(r.outcome, Outcome::Written { .. })));
        assert_eq!(fetcher.calls.borrow().len(), 9);
        assert!(dir.path().join("cover/00.png").exists());
        assert!(dir.path().join("sp500/02.png").exists());
        assert!(dir.path().join("oil/06.png").exists());
        assert!(dir.path().join("review/08.png").exists());
        let before = std::fs::read(dir.path().join("gold/05.png")).unwrap();

        let second = download_all(&fetcher, dir.path(), &images, &a).await;
        assert!(second.iter().all(|r| r.outcome == Outcome::SkippedExisting));
        assert_eq!(fetcher.calls.borrow().len(), 9);
        assert_eq!(std::fs::read(dir.path().join("gold/05.png")).unwrap(), before);
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_images() {
        let dir = tempfile::tempdir().unwrap();
        let urls = urls(9);
        let images = pairs(&urls);
        let a = assignment(9);
        let fetcher = FakeFetcher {
            failing: HashSet::from([urls[5].clone()]),
            ..Default::default()
        };

        let records = download_all(&fetcher, dir.path(), &images, &a).await;
        assert_eq!(records.len(), 9);
        assert!(matches!(records[5].outcome, Outcome::Failed(ref r) if r.contains("503")));
        for r in records.iter().filter(|r| r.index != 5) {
            assert!(matches!(r.outcome, Outcome::Written { .. }), "index {}", r.index);
        }
        assert_eq!(fetcher.calls.borrow().len(), 9);
        assert!(!records[5].path.exists());
        assert!(!dir.path().join("gold/05.png.part").exists());
    }

    #[tokio::test]
    async fn non_image_body_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let urls = urls(2);
        let images = pairs(&urls);
        let fetcher = FakeFetcher {
            body: Some(b"<html>login</html>".to_vec()),
            ..Default::default()
        };
        let records = download_all(&fetcher, dir.path(), &images, &assignment(2)).await;
        assert!(records.iter().all(|r| matches!(r.outcome, Outcome::Failed(_))));
        assert!(!dir.path().join("cover/00.png").exists());
    }

    #[tokio::test]
    async fn metadata_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let meta = Metadata::new("דוח חודשי פברואר 2025", "https://s/report/", &assignment(9));
        let path = write_metadata(dir.path(), &meta).await.unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("דוח חודשי פברואר 2025"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["images"], 9);
        assert_eq!(value["sections"]["cover"], 1);
        assert_eq!(value["sections"]["sp500"], 2);
        assert_eq!(value["sections"]["review"], 2);
        assert!(value["sections"].get("other").is_none());
    }
}
