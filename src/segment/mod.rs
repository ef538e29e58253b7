pub mod assign;
pub mod boundaries;
pub mod items;
pub mod partition;

use crate::config::SegmentationConfig;
use assign::Assignment;
use boundaries::Boundaries;
use items::Item;
use partition::{PartitionMode, Section};

pub struct Segmentation {
    pub boundaries: Boundaries,
    pub sections: Vec<Section>,
    pub mode: PartitionMode,
    pub assignment: Assignment,
}

/// Three-step pipeline: items → boundaries → sections → per-image assignment.
pub fn segment(items: &[Item], cfg: &SegmentationConfig) -> Segmentation {
    let boundaries = boundaries::detect(items, cfg);
    let (sections, mode) = partition::partition(&boundaries, cfg);
    let assignment = assign::resolve(boundaries.total, boundaries.review_start, &sections);
    Segmentation {
        boundaries,
        sections,
        mode,
        assignment,
    }
}

// ── Tests ──
