use tracing::debug;

use super::boundaries::Boundaries;
use super::items::AssetName;
use crate::config::SegmentationConfig;

/// Half-open range `[start, end)` of image indices owned by one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub asset: AssetName,
    pub start: usize,
    pub end: usize,
}

impl Section {
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How the S&P 500 / Bitcoin split point was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Anchored on the first divider image.
    Anchored { divider: usize, clamped: bool },
    /// No dividers; S&P 500 gets a fixed share of the content range.
    Proportional,
}

/// Split `[1, review_start)` into the five asset sections.
///
/// Index 0 (cover) and the review tail are resolved elsewhere. The five
/// ranges are contiguous, non-overlapping and cover exactly
/// `[1, max(review_start, 1))`.
pub fn partition(b: &Boundaries, cfg: &SegmentationConfig) -> (Vec<Section>, PartitionMode) {
    let lo = 1;
    let hi = b.review_start.max(lo);

    let (bitcoin_start, mode) = match b.dividers.first() {
        Some(&divider) => {
            let floor = b.content_start + cfg.min_sp500_len;
            let estimate = divider.saturating_sub(cfg.section_len);
            let clamped = estimate < floor;
            let start = if clamped { floor } else { estimate };
            (start.clamp(lo, hi), PartitionMode::Anchored { divider, clamped })
        }
        None => {
            let content = hi.saturating_sub(b.content_start);
            let share = (cfg.sp500_share * content as f64).floor() as usize;
            ((b.content_start + share).clamp(lo, hi), PartitionMode::Proportional)
        }
    };

    let mut sections = Vec::with_capacity(5);
    sections.push(Section {
        asset: AssetName::Sp500,
        start: lo,
        end: bitcoin_start,
    });
    sections.extend(split_even(bitcoin_start, hi, &AssetName::TRAILING));

    debug!(?mode, ?sections, "partitioned content");
    (sections, mode)
}

/// Consecutive near-equal ranges over `[start, end)`; the first
/// `len % n` sections get one extra image.
fn split_even(start: usize, end: usize, assets: &[AssetName]) -> Vec<Section> {
    let n = assets.len();
    let count = end.saturating_sub(start);
    let base = count / n;
    let extra = count % n;

    let mut pos = start;
    assets
        .iter()
        .enumerate()
        .map(|(i, &asset)| {
            let size = base + usize::from(i < extra);
            let section = Section {
                asset,
                start: pos,
                end: pos + size,
            };
            pos += size;
            section
        })
        .collect()
}
