use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Datelike;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Images per non-S&P asset section (title, key dates, stats, seasonal, chart, disclaimer).
pub const SECTION_LEN: usize = 6;

/// The S&P 500 section is never allowed to shrink below this many images
/// past the start of year-tagged content.
pub const MIN_SP500_LEN: usize = 10;

/// Share of the content range given to S&P 500 when no dividers are found.
pub const SP500_SHARE: f64 = 0.4;

/// First index scanned for year-tagged content: 0 is the cover, 1 the rules slide.
pub const CONTENT_START_DEFAULT: usize = 2;

/// Heading phrase ("how the report worked") that opens the review section.
pub const REVIEW_PHRASE: &str = "כיצד עבד";

/// Filename fragments ("report", "month") carried by section divider slides.
pub const DIVIDER_MARKERS: &[&str] = &["דוח", "חודש"];

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"20\d{2}").unwrap());

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub site: SiteConfig,
    pub credentials: Credentials,
    pub reports_dir: PathBuf,
    pub segmentation: SegmentationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            site: SiteConfig::default(),
            credentials: Credentials::default(),
            reports_dir: PathBuf::from("reports"),
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl Settings {
    /// `.env`, then optional `cycles.toml`, then `CYCLES_*` environment variables
    /// (`CYCLES_CREDENTIALS__EMAIL`). Plain `EMAIL` / `PASSWORD` fill credentials
    /// left unset.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut settings: Settings = config::Config::builder()
            .add_source(config::File::with_name("cycles").required(false))
            .add_source(
                config::Environment::with_prefix("CYCLES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")?;
        settings.credentials = settings
            .credentials
            .or_fallback(std::env::var("EMAIL").ok(), std::env::var("PASSWORD").ok());
        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// Site name appended to every page `<title>`.
    pub title_suffix: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            base_url: "https://cyclestrading-course.com/".to_string(),
            title_suffix: " – סייקלס טריידינג".to_string(),
            user_agent: concat!("cycles_reports/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.email.trim().is_empty() || self.password.is_empty()
    }

    /// Fill empty fields from `email` / `password`.
    pub fn or_fallback(mut self, email: Option<String>, password: Option<String>) -> Self {
        if self.email.trim().is_empty() {
            self.email = email.unwrap_or_default();
        }
        if self.password.is_empty() {
            self.password = password.unwrap_or_default();
        }
        self
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Tuning knobs for boundary detection and partitioning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub section_len: usize,
    pub min_sp500_len: usize,
    pub sp500_share: f64,
    pub content_start: usize,
    pub review_phrase: String,
    pub divider_markers: Vec<String>,
    /// Upload path fragment of the current cycle, e.g. `/2025/`.
    /// Derived from the report title when unset.
    pub cycle_marker: Option<String>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        SegmentationConfig {
            section_len: SECTION_LEN,
            min_sp500_len: MIN_SP500_LEN,
            sp500_share: SP500_SHARE,
            content_start: CONTENT_START_DEFAULT,
            review_phrase: REVIEW_PHRASE.to_string(),
            divider_markers: DIVIDER_MARKERS.iter().map(|m| m.to_string()).collect(),
            cycle_marker: None,
        }
    }
}

impl SegmentationConfig {
    /// Copy of this config with the cycle marker pinned for one report.
    pub fn for_title(&self, title: &str) -> SegmentationConfig {
        let mut cfg = self.clone();
        if cfg.cycle_marker.is_none() {
            let year = year_in(title).unwrap_or_else(current_year);
            cfg.cycle_marker = Some(format!("/{}/", year));
        }
        cfg
    }
}

/// First `20xx` year appearing in `text`.
pub fn year_in(text: &str) -> Option<String> {
    YEAR_RE.find(text).map(|m| m.as_str().to_string())
}

/// Current calendar year, the default report year for `download` and `list`.
pub fn current_year() -> String {
    chrono::Local::now().year().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_constants() {
        let cfg = SegmentationConfig::default();
        assert_eq!(cfg.section_len, 6);
        assert_eq!(cfg.min_sp500_len, 10);
        assert_eq!(cfg.sp500_share, 0.4);
        assert_eq!(cfg.content_start, 2);
        assert_eq!(cfg.divider_markers, vec!["דוח", "חודש"]);
        assert!(cfg.cycle_marker.is_none());
    }

    #[test]
    fn cycle_marker_from_title_year() {
        let cfg = SegmentationConfig::default().for_title("דוח חודשי פברואר 2025");
        assert_eq!(cfg.cycle_marker.as_deref(), Some("/2025/"));
    }

    #[test]
    fn explicit_cycle_marker_wins() {
        let cfg = SegmentationConfig {
            cycle_marker: Some("/2024/".into()),
            ..Default::default()
        };
        let pinned = cfg.for_title("דוח חודשי מרץ 2025");
        assert_eq!(pinned.cycle_marker.as_deref(), Some("/2024/"));
    }

    #[test]
    fn title_without_year_uses_current_year() {
        let cfg = SegmentationConfig::default().for_title("דוח חודשי");
        assert_eq!(cfg.cycle_marker, Some(format!("/{}/", current_year())));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            email: "a@b.c".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{:?}", creds);
        assert!(!shown.contains("hunter2"));
        assert!(!creds.is_empty());
        assert!(Credentials::default().is_empty());
    }

    #[test]
    fn credentials_from_prefixed_env() {
        std::env::set_var("CYCLES_CREDENTIALS__EMAIL", "me@x.com");
        std::env::set_var("CYCLES_CREDENTIALS__PASSWORD", "hunter2");
        std::env::set_var("CYCLES_REPORTS_DIR", "out");
        let settings = Settings::load().unwrap();
        std::env::remove_var("CYCLES_CREDENTIALS__EMAIL");
        std::env::remove_var("CYCLES_CREDENTIALS__PASSWORD");
        std::env::remove_var("CYCLES_REPORTS_DIR");

        assert_eq!(settings.credentials.email, "me@x.com");
        assert_eq!(settings.credentials.password, "hunter2");
        assert_eq!(settings.reports_dir, PathBuf::from("out"));
        assert!(!settings.credentials.is_empty());
    }

    #[test]
    fn plain_keys_fill_missing_credentials() {
        let creds = Credentials::default().or_fallback(Some("a@b.c".into()), Some("pw".into()));
        assert_eq!(creds.email, "a@b.c");
        assert_eq!(creds.password, "pw");

        let set = Credentials {
            email: "set@x.com".into(),
            password: "kept".into(),
        };
        let creds = set.or_fallback(Some("other@x.com".into()), None);
        assert_eq!(creds.email, "set@x.com");
        assert_eq!(creds.password, "kept");
    }
}
