pub mod extract;
pub mod http;
pub mod listing;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Result;
use crate::segment::items::Item;

static PASSWORD_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form[^>]*class="[^"]*post-password-form|<input[^>]*name=["']post_password["']"#)
        .unwrap()
});
static PASSWORD_REQUIRED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)class="[^"]*\bpost-password-required\b"#).unwrap());
static LD_ALERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]*class="[^"]*\bld-alert-warning\b[^"]*"[^>]*>(.*?)</div>"#).unwrap()
});

/// "Protected" as shown in group-restriction notices.
const GROUP_PROTECTED_MARKER: &str = "מוגן";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionState {
    None,
    PasswordRequired,
    GroupProtected,
}

impl fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtectionState::None => "none",
            ProtectionState::PasswordRequired => "password-required",
            ProtectionState::GroupProtected => "group-protected",
        };
        f.write_str(s)
    }
}

/// Classify the access notice, if any, on a rendered report page.
pub fn probe_protection(html: &str) -> ProtectionState {
    if PASSWORD_FORM_RE.is_match(html) || PASSWORD_REQUIRED_RE.is_match(html) {
        return ProtectionState::PasswordRequired;
    }
    let group_notice = LD_ALERT_RE
        .captures_iter(html)
        .any(|c| c[1].contains(GROUP_PROTECTED_MARKER));
    if group_notice {
        ProtectionState::GroupProtected
    } else {
        ProtectionState::None
    }
}

/// Everything one visit to a report page yields.
#[derive(Debug, Clone)]
pub struct ReportPage {
    pub url: String,
    pub title: String,
    pub items: Vec<Item>,
    pub protection: ProtectionState,
}

/// Byte access through the authenticated session.
pub trait ImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// A logged-in browsing session able to open report pages.
pub trait ReportSession: ImageFetcher {
    async fn open_report(&self, url: &str) -> Result<ReportPage>;
}
