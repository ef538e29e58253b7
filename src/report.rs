use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{year_in, SegmentationConfig, Settings};
use crate::download::{self, DownloadRecord, Metadata, Outcome};
use crate::error::{ReportError, Result};
use crate::segment::{self, items, Segmentation};
use crate::session::{ProtectionState, ReportPage, ReportSession};

const HEBREW_MONTHS: [(&str, &str); 12] = [
    ("ינואר", "01"),
    ("פברואר", "02"),
    ("מרץ", "03"),
    ("אפריל", "04"),
    ("מאי", "05"),
    ("יוני", "06"),
    ("יולי", "07"),
    ("אוגוסט", "08"),
    ("ספטמבר", "09"),
    ("אוקטובר", "10"),
    ("נובמבר", "11"),
    ("דצמבר", "12"),
];

const SPECIAL_MARKER: &str = "מיוחד";
const FORECAST_MARKER: &str = "תחזית";
const ANNUAL_MARKER: &str = "שנתית";

/// `{year}/{MM}` folder for a report title, with special and annual
/// reports kept apart from the monthly ones.
pub fn title_to_path(title: &str) -> PathBuf {
    let year = year_in(title).unwrap_or_else(|| "unknown".to_string());
    let Some(month) = HEBREW_MONTHS
        .iter()
        .find(|(name, _)| title.contains(name))
        .map(|(_, num)| *num)
    else {
        let slug = title.trim().replace([' ', '/', '\\'], "-");
        return Path::new(&year).join(slug);
    };

    if title.contains(FORECAST_MARKER) && title.contains(ANNUAL_MARKER) {
        return Path::new(&year).join("annual-forecast");
    }
    if title.contains(SPECIAL_MARKER) || title.contains(FORECAST_MARKER) {
        return Path::new(&year).join(format!("{}-special", month));
    }
    Path::new(&year).join(month)
}

/// Segment an opened report. A page with no images is an error for that report.
pub fn plan(page: &ReportPage, cfg: &SegmentationConfig) -> Result<Segmentation> {
    let image_count = items::images(&page.items).len();
    if image_count == 0 {
        return Err(ReportError::ExtractionEmpty {
            url: page.url.clone(),
        });
    }
    let cfg = cfg.for_title(&page.title);
    Ok(segment::segment(&page.items, &cfg))
}

/// Surface protection notices so an empty report can be told apart from a denied one.
pub fn report_protection(page: &ReportPage) {
    if page.protection != ProtectionState::None {
        warn!("{} on {}", ReportError::ProtectionDetected(page.protection), page.url);
        warn!("The current account may lack the group membership this report requires.");
    }
}

pub struct RunSummary {
    pub dir: PathBuf,
    pub protection: ProtectionState,
    pub segmentation: Segmentation,
    pub records: Vec<DownloadRecord>,
    pub metadata: Metadata,
}

impl RunSummary {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::SkippedExisting))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }
}

/// Open, segment and download one report, then write its metadata sidecar.
pub async fn download_report<S: ReportSession>(
    session: &S,
    url: &str,
    settings: &Settings,
) -> Result<RunSummary> {
    let page = session.open_report(url).await?;
    info!("Report: {}", page.title);
    report_protection(&page);

    let segmentation = plan(&page, &settings.segmentation)?;
    let dir = settings.reports_dir.join(title_to_path(&page.title));
    tokio::fs::create_dir_all(&dir).await?;
    info!("Downloading {} images to {}", segmentation.assignment.len(), dir.display());

    let images = items::images(&page.items);
    let records = download::download_all(session, &dir, &images, &segmentation.assignment).await;

    let metadata = Metadata::new(&page.title, &page.url, &segmentation.assignment);
    download::write_metadata(&dir, &metadata).await?;

    Ok(RunSummary {
        dir,
        protection: page.protection,
        segmentation,
        records,
        metadata,
    })
}

// ── Tests ──
