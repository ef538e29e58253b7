use std::sync::LazyLock;

use anyhow::Result;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use tracing::info;

use super::extract::{attributes, plain_text};
use super::http::{title_from_url, HttpSession};

const SITEMAP_PATH: &str = "wp-sitemap-posts-post-1.xml";

/// "Report", present in every report slug.
const REPORT_MARKER: &str = "דוח";

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLink {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// Reports published for `year`, newest first as the site lists them.
pub async fn discover(session: &HttpSession, year: &str) -> Result<Vec<ReportLink>> {
    let home = session.base().clone();
    info!("Fetching report links from {}", home);
    let html = session.get_text(home.clone()).await?;
    let links = links_for_year(&html, &home, year);
    if !links.is_empty() {
        info!("Found {} report links for {}", links.len(), year);
        return Ok(links);
    }

    let sitemap = session.resolve(SITEMAP_PATH)?;
    info!("No report links on the homepage for {}, trying {}", year, sitemap);
    let xml = session.get_text(sitemap).await?;
    let links = sitemap_reports(&parse_urlset(&xml)?, year);
    info!("Sitemap entries for {}: {}", year, links.len());
    Ok(links)
}

/// Same-site post links whose URL mentions `year`, deduplicated in page order.
pub fn links_for_year(html: &str, base: &Url, year: &str) -> Vec<ReportLink> {
    let mut links: Vec<ReportLink> = Vec::new();

    for caps in ANCHOR_RE.captures_iter(html) {
        let Some(href) = attributes(&caps[1]).remove("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            continue;
        };
        if url.host_str() != base.host_str() || url.path().contains("/wp-content/") {
            continue;
        }
        let decoded = decode(url.as_str());
        if !url.as_str().contains(year) && !decoded.contains(year) {
            continue;
        }

        let text = plain_text(&caps[2]);
        match links.iter().position(|l| l.url == url.as_str()) {
            Some(i) if links[i].title.is_empty() => links[i].title = text,
            Some(_) => {}
            None => {
                let index = links.len();
                links.push(ReportLink {
                    index,
                    title: text,
                    url: url.to_string(),
                });
            }
        }
    }

    for link in links.iter_mut().filter(|l| l.title.is_empty()) {
        if let Ok(url) = Url::parse(&link.url) {
            link.title = title_from_url(&url);
        }
    }
    links
}

/// Report posts from sitemap `<loc>` entries.
pub fn sitemap_reports(urls: &[String], year: &str) -> Vec<ReportLink> {
    urls.iter()
        .filter(|u| {
            let decoded = decode(u);
            decoded.contains(year) && decoded.contains(REPORT_MARKER)
        })
        .filter_map(|u| Url::parse(u).ok())
        .enumerate()
        .map(|(index, url)| ReportLink {
            index,
            title: title_from_url(&url),
            url: url.to_string(),
        })
        .collect()
}

/// Parse a urlset XML and return all <loc> URLs.
pub fn parse_urlset(xml: &str) -> Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut urls = Vec::new();
    let mut in_url = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.name().as_ref() {
                b"url" => in_url = true,
                b"loc" if in_url => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                urls.push(e.unescape()?.trim().to_string());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.name().as_ref() {
                b"loc" => in_loc = false,
                b"url" => in_url = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(urls)
}

fn decode(url: &str) -> String {
    percent_decode_str(url).decode_utf8_lossy().into_owned()
}
