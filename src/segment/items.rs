use std::collections::HashSet;
use std::fmt;

use percent_encoding::percent_decode_str;
use serde::Serialize;

/// One extracted element of a report, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Image { index: usize, src: String },
    /// `after_image` is the index of the last image seen before the heading.
    Heading { text: String, after_image: Option<usize> },
}

impl Item {
    pub fn as_image(&self) -> Option<(usize, &str)> {
        match self {
            Item::Image { index, src } => Some((*index, src.as_str())),
            Item::Heading { .. } => None,
        }
    }
}

/// Image `(index, src)` pairs in index order.
pub fn images(items: &[Item]) -> Vec<(usize, &str)> {
    items.iter().filter_map(Item::as_image).collect()
}

/// Builds an item list, numbering images sequentially and dropping repeated sources.
#[derive(Debug, Default)]
pub struct ItemsBuilder {
    items: Vec<Item>,
    seen: HashSet<String>,
    next_index: usize,
}

impl ItemsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `src` was already recorded.
    pub fn push_image(&mut self, src: impl Into<String>) -> bool {
        let src = src.into();
        if !self.seen.insert(src.clone()) {
            return false;
        }
        self.items.push(Item::Image {
            index: self.next_index,
            src,
        });
        self.next_index += 1;
        true
    }

    pub fn push_heading(&mut self, text: impl Into<String>) {
        self.items.push(Item::Heading {
            text: text.into(),
            after_image: self.next_index.checked_sub(1),
        });
    }

    pub fn image_count(&self) -> usize {
        self.next_index
    }

    pub fn build(self) -> Vec<Item> {
        self.items
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetName {
    Cover,
    Sp500,
    Bitcoin,
    Eurusd,
    Gold,
    Oil,
    Review,
    Other,
}

impl AssetName {
    pub const ALL: [AssetName; 8] = [
        AssetName::Cover,
        AssetName::Sp500,
        AssetName::Bitcoin,
        AssetName::Eurusd,
        AssetName::Gold,
        AssetName::Oil,
        AssetName::Review,
        AssetName::Other,
    ];

    /// The four uniform sections that follow S&P 500, in report order.
    pub const TRAILING: [AssetName; 4] = [
        AssetName::Bitcoin,
        AssetName::Eurusd,
        AssetName::Gold,
        AssetName::Oil,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetName::Cover => "cover",
            AssetName::Sp500 => "sp500",
            AssetName::Bitcoin => "bitcoin",
            AssetName::Eurusd => "eurusd",
            AssetName::Gold => "gold",
            AssetName::Oil => "oil",
            AssetName::Review => "review",
            AssetName::Other => "other",
        }
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last path segment of `url`, without query or fragment, percent-decoded.
pub fn file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    percent_decode_str(last).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_do_not_consume_indices() {
        let mut b = ItemsBuilder::new();
        b.push_heading("intro");
        b.push_image("a.png");
        b.push_heading("after a");
        b.push_image("b.png");
        let items = b.build();
        assert_eq!(
            items,
            vec![
                Item::Heading { text: "intro".into(), after_image: None },
                Item::Image { index: 0, src: "a.png".into() },
                Item::Heading { text: "after a".into(), after_image: Some(0) },
                Item::Image { index: 1, src: "b.png".into() },
            ]
        );
    }

    #[test]
    fn repeated_sources_are_dropped() {
        let mut b = ItemsBuilder::new();
        assert!(b.push_image("a.png"));
        assert!(!b.push_image("a.png"));
        assert!(b.push_image("b.png"));
        assert_eq!(b.image_count(), 2);
        let items = b.build();
        assert_eq!(images(&items), vec![(0, "a.png"), (1, "b.png")]);
    }

    #[test]
    fn file_name_decodes_hebrew() {
        let url = "https://x.com/wp-content/uploads/2025/02/%D7%93%D7%95%D7%97-1.png?ver=2";
        assert_eq!(file_name(url), "דוח-1.png");
    }

    #[test]
    fn asset_names_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&AssetName::Sp500).unwrap(), "\"sp500\"");
        assert_eq!(AssetName::Eurusd.to_string(), "eurusd");
    }
}
