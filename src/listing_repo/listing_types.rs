use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of a listing inside one load: the 0-based data row it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PropertyId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layout {
    OneR,
    OneK,
    OneDK,
    OneLDK,
    TwoK,
    TwoDK,
    TwoLDK,
    ThreeK,
    ThreeDK,
    FourK,
}

impl Layout {
    pub const ALL: [Layout; 10] = [
        Layout::OneR,
        Layout::OneK,
        Layout::OneDK,
        Layout::OneLDK,
        Layout::TwoK,
        Layout::TwoDK,
        Layout::TwoLDK,
        Layout::ThreeK,
        Layout::ThreeDK,
        Layout::FourK,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Layout::OneR => "1R",
            Layout::OneK => "1K",
            Layout::OneDK => "1DK",
            Layout::OneLDK => "1LDK",
            Layout::TwoK => "2K",
            Layout::TwoDK => "2DK",
            Layout::TwoLDK => "2LDK",
            Layout::ThreeK => "3K",
            Layout::ThreeDK => "3DK",
            Layout::FourK => "4K",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Layout {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownLayout(pub String);

impl FromStr for Layout {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        if normalized == "STUDIO" || normalized == "ワンルーム" {
            return Ok(Layout::OneR);
        }
        Layout::ALL
            .iter()
            .find(|layout| layout.label() == normalized)
            .cloned()
            .ok_or_else(|| UnknownLayout(s.to_owned()))
    }
}

/// One normalized listing. Never mutated after the repository builds it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub rent: u64,
    pub address: String,
    pub floor: String,
    pub layout: Layout,
    pub latitude: f64,
    pub longitude: f64,
}

impl Property {
    #[inline]
    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::from((self.longitude, self.latitude))
    }
}

pub type RawRow = HashMap<String, String>;

/// Rows of named text fields as fetched from a source, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_parse_layout_labels_case_insensitively() {
        assert_eq!("2ldk".parse::<Layout>(), Ok(Layout::TwoLDK));
        assert_eq!(" 1K ".parse::<Layout>(), Ok(Layout::OneK));
        assert_eq!("Studio".parse::<Layout>(), Ok(Layout::OneR));
    }

    #[test]
    fn it_should_reject_unknown_layouts() {
        assert_eq!(
            "5SLDK".parse::<Layout>(),
            Err(UnknownLayout("5SLDK".to_owned()))
        );
    }

    #[test]
    fn it_should_display_the_canonical_label() {
        for layout in Layout::ALL.iter() {
            assert_eq!(layout.to_string().parse::<Layout>(), Ok(*layout));
        }
    }
}
