use tracing::debug;

use super::items::{file_name, Item};
use crate::config::SegmentationConfig;

/// Structural facts found in one report's item stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundaries {
    pub total: usize,
    /// First image past the year-tagged intro run.
    pub content_start: usize,
    /// First image of the review section; `total` when there is none.
    pub review_start: usize,
    /// Divider images in `[content_start, review_start)`, ascending.
    pub dividers: Vec<usize>,
}

pub fn detect(items: &[Item], cfg: &SegmentationConfig) -> Boundaries {
    let images: Vec<(usize, &str)> = items.iter().filter_map(Item::as_image).collect();
    let total = images.len();

    let review_start = find_review_start(items, &cfg.review_phrase).unwrap_or(total);
    let content_start = find_content_start(&images, cfg);

    let markers: Vec<String> = cfg.divider_markers.iter().map(|m| m.to_lowercase()).collect();
    let dividers: Vec<usize> = images
        .iter()
        .filter(|(idx, _)| (content_start..review_start).contains(idx))
        .filter(|(_, src)| is_divider(src, &markers))
        .map(|(idx, _)| *idx)
        .collect();

    debug!(total, content_start, review_start, ?dividers, "boundaries detected");

    Boundaries {
        total,
        content_start,
        review_start,
        dividers,
    }
}

/// The review section starts at the image just before its heading.
fn find_review_start(items: &[Item], phrase: &str) -> Option<usize> {
    items.iter().find_map(|item| match item {
        Item::Heading { text, after_image } if text.contains(phrase) => {
            Some(after_image.unwrap_or(0))
        }
        _ => None,
    })
}

/// Walk forward from the default start while sources carry the cycle marker.
fn find_content_start(images: &[(usize, &str)], cfg: &SegmentationConfig) -> usize {
    let mut start = cfg.content_start;
    let Some(marker) = cfg.cycle_marker.as_deref() else {
        return start;
    };
    for (idx, src) in images.iter().skip(cfg.content_start) {
        if src.contains(marker) {
            start = idx + 1;
        } else {
            break;
        }
    }
    start
}

fn is_divider(src: &str, markers: &[String]) -> bool {
    let name = file_name(src).to_lowercase();
    markers.iter().any(|m| name.contains(m.as_str()))
}
