use std::collections::BTreeMap;

use super::items::AssetName;
use super::partition::Section;

/// Total map from image index to the asset folder it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment(Vec<AssetName>);

impl Assignment {
    pub fn get(&self, index: usize) -> AssetName {
        self.0.get(index).copied().unwrap_or(AssetName::Other)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Images per asset; assets with no images are left out.
    pub fn counts(&self) -> BTreeMap<AssetName, usize> {
        let mut counts = BTreeMap::new();
        for asset in &self.0 {
            *counts.entry(*asset).or_insert(0) += 1;
        }
        counts
    }
}

pub fn resolve(total: usize, review_start: usize, sections: &[Section]) -> Assignment {
    let assets = (0..total)
        .map(|idx| {
            if idx == 0 {
                AssetName::Cover
            } else if idx >= review_start {
                AssetName::Review
            } else {
                sections
                    .iter()
                    .find(|s| s.contains(idx))
                    .map(|s| s.asset)
                    .unwrap_or(AssetName::Other)
            }
        })
        .collect();
    Assignment(assets)
}
