use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use tracing::debug;

use crate::segment::items::{Item, ItemsBuilder};

static OPEN_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(div|article|main|section)\b([^>]*)>").unwrap());
static FIGURE_OR_H2_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<figure\b[^>]*>(?P<figure>.*?)</figure>|<h2\b[^>]*>(?P<h2>.*?)</h2>").unwrap()
});
static IMG_OR_H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(?P<img><img\b[^>]*>)|<h2\b[^>]*>(?P<h2>.*?)</h2>").unwrap());
static IMG_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static THUMB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\d+x\d+\.").unwrap());
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)&#(x[0-9a-f]+|\d+);").unwrap());
static FOOTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<footer\b").unwrap());

/// Attributes checked for an image source, best first. Lazy loaders keep the
/// real URL in a data attribute and put a placeholder in `src`.
const SRC_ATTRS: &[&str] = &["data-orig-file", "data-lazy-src", "data-src", "src"];

/// Sources containing any of these are site chrome, not report content.
const SKIP_MARKERS: &[&str] = &["svg", "logo", "avatar", "gravatar", "emoji", "icon", "smilies"];

struct Container {
    tag: Option<&'static str>,
    classes: &'static [&'static str],
}

/// Post body containers, most specific first.
const CONTAINERS: &[Container] = &[
    Container { tag: None, classes: &["entry-content", "single-content"] },
    Container { tag: None, classes: &["entry-content"] },
    Container { tag: None, classes: &["elementor-widget-theme-post-content"] },
    Container { tag: Some("article"), classes: &[] },
    Container { tag: Some("main"), classes: &[] },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One image per `<figure>`, plus `<h2>` headings.
    Figures,
    /// Every `<img>` in the post body, plus `<h2>` headings.
    AllImages,
}

impl Strategy {
    pub const ORDER: [Strategy; 2] = [Strategy::Figures, Strategy::AllImages];

    pub fn extract(&self, html: &str, base: &Url) -> Vec<Item> {
        let region = content_region(html);
        let mut items = ItemsBuilder::new();
        match self {
            Strategy::Figures => {
                for caps in FIGURE_OR_H2_RE.captures_iter(region) {
                    if let Some(figure) = caps.name("figure") {
                        if let Some(src) = IMG_TAG_RE
                            .find(figure.as_str())
                            .and_then(|img| image_source(img.as_str(), base))
                        {
                            items.push_image(src);
                        }
                    } else if let Some(h2) = caps.name("h2") {
                        items.push_heading(plain_text(h2.as_str()));
                    }
                }
            }
            Strategy::AllImages => {
                for caps in IMG_OR_H2_RE.captures_iter(region) {
                    if let Some(img) = caps.name("img") {
                        if let Some(src) = image_source(img.as_str(), base) {
                            items.push_image(src);
                        }
                    } else if let Some(h2) = caps.name("h2") {
                        items.push_heading(plain_text(h2.as_str()));
                    }
                }
            }
        }
        if items.image_count() == 0 {
            return Vec::new();
        }
        items.build()
    }
}

/// Run the strategies in order; the first one that finds images wins.
pub fn extract_items(html: &str, base: &Url) -> Option<(Strategy, Vec<Item>)> {
    Strategy::ORDER.into_iter().find_map(|strategy| {
        let items = strategy.extract(html, base);
        debug!(?strategy, found = items.len(), "extraction strategy tried");
        (!items.is_empty()).then_some((strategy, items))
    })
}

/// Slice of `html` from the post body container to the page footer, or the
/// whole document when no container is recognized.
fn content_region(html: &str) -> &str {
    let tags: Vec<(usize, String, Vec<String>)> = OPEN_TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let tag = caps[1].to_ascii_lowercase();
            let classes = attributes(&caps[2])
                .remove("class")
                .map(|c| c.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            Some((start, tag, classes))
        })
        .collect();

    let start = CONTAINERS.iter().find_map(|container| {
        tags.iter()
            .find(|(_, tag, classes)| {
                container.tag.map_or(true, |t| t == tag.as_str())
                    && container
                        .classes
                        .iter()
                        .all(|c| classes.iter().any(|have| have.as_str() == *c))
            })
            .map(|(start, _, _)| *start)
    });

    match start {
        Some(start) => {
            let rest = &html[start..];
            let end = FOOTER_RE.find(rest).map_or(rest.len(), |m| m.start());
            &rest[..end]
        }
        None => html,
    }
}

/// Quoted attributes of one HTML start tag, names lowercased, values entity-decoded.
pub(crate) fn attributes(tag: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(tag)
        .map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            (caps[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

/// Full-resolution absolute URL of an `<img>` tag, if it is report content.
fn image_source(img_tag: &str, base: &Url) -> Option<String> {
    let attrs = attributes(img_tag);
    let (attr, raw) = SRC_ATTRS.iter().find_map(|name| {
        attrs
            .get(*name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && !v.starts_with("data:"))
            .map(|v| (*name, v))
    })?;

    let lower = raw.to_lowercase();
    if SKIP_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }

    let full = if attr == "data-orig-file" {
        raw.to_string()
    } else {
        THUMB_RE.replace(raw, ".").into_owned()
    };
    base.join(&full).ok().map(String::from)
}

/// Text content of an HTML fragment, whitespace collapsed.
pub(crate) fn plain_text(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |caps: &regex::Captures| {
        let code = &caps[1];
        let value = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    numeric
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::items::images;

    fn base() -> Url {
        Url::parse("https://cyclestrading-course.com/report-feb-2025/").unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn report_fixture_uses_figures() {
        let html = fixture("report");
        let (strategy, items) = extract_items(&html, &base()).unwrap();
        assert_eq!(strategy, Strategy::Figures);

        let imgs = images(&items);
        assert_eq!(imgs.len(), 6);
        // lazy data-src wins over the svg placeholder, thumbnail suffix removed
        assert_eq!(
            imgs[0].1,
            "https://cyclestrading-course.com/wp-content/uploads/2025/02/cover.png"
        );
        // data-orig-file kept verbatim
        assert_eq!(
            imgs[1].1,
            "https://cyclestrading-course.com/wp-content/uploads/2022/05/rules-1024x768.jpg"
        );
        // relative source resolved against the page
        assert_eq!(
            imgs[5].1,
            "https://cyclestrading-course.com/wp-content/uploads/2025/02/review-1.png"
        );
        // logo in the header and the repeated figure are not counted
        assert!(imgs.iter().all(|(_, src)| !src.contains("logo")));

        let review = items
            .iter()
            .find_map(|item| match item {
                Item::Heading { text, after_image } if text.contains("כיצד עבד") => {
                    Some(*after_image)
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(review, Some(4));
    }

    #[test]
    fn loose_images_fall_back_to_all_images() {
        let html = r#"
            <div class="entry-content">
              <p><img src="/wp-content/uploads/2025/03/a-300x200.png"></p>
              <h2>S&amp;P 500</h2>
              <p><img data-lazy-src="/wp-content/uploads/2025/03/b.webp" src="data:image/gif;base64,R0lG"></p>
            </div>"#;
        let (strategy, items) = extract_items(html, &base()).unwrap();
        assert_eq!(strategy, Strategy::AllImages);
        assert_eq!(
            items,
            vec![
                Item::Image {
                    index: 0,
                    src: "https://cyclestrading-course.com/wp-content/uploads/2025/03/a.png".into()
                },
                Item::Heading { text: "S&P 500".into(), after_image: Some(0) },
                Item::Image {
                    index: 1,
                    src: "https://cyclestrading-course.com/wp-content/uploads/2025/03/b.webp".into()
                },
            ]
        );
    }

    #[test]
    fn page_without_images_yields_nothing() {
        let html = "<html><body><main><h2>Nothing here</h2></main></body></html>";
        assert!(extract_items(html, &base()).is_none());
    }

    #[test]
    fn region_stops_at_footer() {
        let html = r#"<article><figure><img src="/x/1.png"></figure></article>
            <footer><figure><img src="/x/2.png"></figure></footer>"#;
        let (_, items) = extract_items(html, &base()).unwrap();
        assert_eq!(images(&items).len(), 1);
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("a &amp; b&#8211;c &#x5D3;"), "a & b–c ד");
        assert_eq!(plain_text("  <strong>כיצד</strong>&nbsp;עבד "), "כיצד עבד");
    }
}
