use std::sync::{Arc, LazyLock};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::extract::{self, plain_text};
use super::{probe_protection, ImageFetcher, ReportPage, ReportSession};
use crate::config::{Credentials, SiteConfig};
use crate::error::{ReportError, Result};
use crate::segment::items::Item;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const LOGGED_IN_COOKIE: &str = "wordpress_logged_in";

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static LOGIN_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<div[^>]*id="login_error"[^>]*>(.*?)</div>"#).unwrap());

#[derive(Deserialize)]
struct RestPost {
    content: RestContent,
}

#[derive(Deserialize)]
struct RestContent {
    rendered: String,
}

/// Logged-in WordPress session; cookies persist across every request.
pub struct HttpSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
    title_suffix: String,
}

impl HttpSession {
    /// Build the client and log in with `credentials`.
    pub async fn connect(site: &SiteConfig, credentials: &Credentials) -> Result<Self> {
        if credentials.is_empty() {
            return Err(ReportError::Config(
                "credentials.email and credentials.password must be set (CYCLES_CREDENTIALS__EMAIL / CYCLES_CREDENTIALS__PASSWORD)".into(),
            ));
        }
        let base = Url::parse(&site.base_url)
            .map_err(|e| ReportError::Config(format!("invalid site.base_url {:?}: {}", site.base_url, e)))?;

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(site.user_agent.as_str())
            .timeout(Duration::from_secs(site.timeout_secs))
            .build()?;

        let session = HttpSession {
            client,
            jar,
            base,
            title_suffix: site.title_suffix.clone(),
        };
        session.login(credentials).await?;
        Ok(session)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn login(&self, credentials: &Credentials) -> Result<()> {
        let login_url = self.resolve("wp-login.php")?;
        info!("Logging in at {}", login_url);

        // The login form only accepts posts once its test cookie is set.
        self.client.get(login_url.clone()).send().await?.error_for_status()?;

        let body = self
            .client
            .post(login_url)
            .form(&[
                ("log", credentials.email.as_str()),
                ("pwd", credentials.password.as_str()),
                ("wp-submit", "Log In"),
                ("redirect_to", self.base.as_str()),
                ("testcookie", "1"),
            ])
            .send()
            .await?
            .text()
            .await?;

        if self.logged_in() {
            info!("Login successful");
            return Ok(());
        }
        let reason = LOGIN_ERROR_RE
            .captures(&body)
            .map(|c| plain_text(&c[1]))
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "no session cookie after login".to_string());
        Err(ReportError::LoginFailed(reason))
    }

    fn logged_in(&self) -> bool {
        self.jar
            .cookies(&self.base)
            .and_then(|header| header.to_str().ok().map(|c| c.contains(LOGGED_IN_COOKIE)))
            .unwrap_or(false)
    }

    /// Absolute URL for `path`, relative to the site root.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ReportError::Config(format!("bad url {:?}: {}", path, e)))
    }

    /// GET with backoff on rate limiting and server errors.
    async fn get_with_retry(&self, url: Url) -> reqwest::Result<Response> {
        for attempt in 0..MAX_RETRIES {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();
            let should_retry = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !should_retry {
                return Ok(response);
            }
            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
                status,
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
        self.client.get(url).send().await
    }

    pub async fn get_text(&self, url: Url) -> Result<String> {
        let text = self.get_with_retry(url).await?.error_for_status()?.text().await?;
        Ok(text)
    }

    /// Items from the REST rendering of the post, for pages whose markup
    /// hides the body from the HTML strategies.
    async fn rest_items(&self, page_url: &Url) -> Result<Vec<Item>> {
        let Some(slug) = page_slug(page_url) else {
            return Ok(Vec::new());
        };
        let mut api = self.resolve("wp-json/wp/v2/posts")?;
        api.query_pairs_mut().append_pair("slug", &slug);
        debug!("Trying REST content at {}", api);

        let posts: Vec<RestPost> = self
            .get_with_retry(api)
            .await?
            .error_for_status()?
            .json()
            .await?;
        let items = posts
            .first()
            .and_then(|post| extract::extract_items(&post.content.rendered, page_url))
            .map(|(_, items)| items)
            .unwrap_or_default();
        Ok(items)
    }
}

impl ImageFetcher for HttpSession {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let failed = |reason: String| ReportError::FetchFailed {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| failed(e.to_string()))?;
        let response = self
            .get_with_retry(parsed)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status)));
        }
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl ReportSession for HttpSession {
    async fn open_report(&self, url: &str) -> Result<ReportPage> {
        let page_url = self.resolve(url)?;
        info!("Opening report {}", page_url);
        let html = self.get_text(page_url.clone()).await?;

        let title = page_title(&html, &self.title_suffix).unwrap_or_else(|| title_from_url(&page_url));
        let protection = probe_protection(&html);

        let items = match extract::extract_items(&html, &page_url) {
            Some((strategy, items)) => {
                debug!(?strategy, items = items.len(), "page extraction succeeded");
                items
            }
            None => self.rest_items(&page_url).await.unwrap_or_else(|e| {
                warn!("REST fallback failed for {}: {}", page_url, e);
                Vec::new()
            }),
        };

        Ok(ReportPage {
            url: url.to_string(),
            title,
            items,
            protection,
        })
    }
}

/// Page `<title>` with the site name suffix removed.
fn page_title(html: &str, suffix: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?;
    let title = plain_text(&raw[1]);
    let title = title.strip_suffix(suffix).unwrap_or(&title).trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Readable title from the page slug, for pages without a `<title>`.
pub(crate) fn title_from_url(url: &Url) -> String {
    page_slug(url)
        .map(|slug| slug.replace('-', " "))
        .unwrap_or_else(|| url.to_string())
}

/// Last non-empty path segment, percent-decoded.
fn page_slug(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}
