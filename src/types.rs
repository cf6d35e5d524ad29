use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// A named region from the static geography. `alias` holds the secondary
/// spelling some data sources use (e.g. "United States of America" vs "United States").
#[derive(Debug, Clone)]
pub struct RegionFeature {
    pub name: String,
    pub alias: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

/// One data row reduced to the region it names and its measure.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub region: String,
    pub value: f64,
}

impl Observation {
    pub fn new(region: impl Into<String>, value: f64) -> Self {
        Self {
            region: region.into(),
            value,
        }
    }
}

/// Host-side field metadata.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub label: Option<String>,
    pub label_short: Option<String>,
}

impl FieldMeta {
    /// Label shown in tooltips and the legend. Falls back from the requested
    /// form to whatever the host did provide.
    pub fn display_label(&self, full: bool) -> &str {
        let (first, second) = if full {
            (&self.label, &self.label_short)
        } else {
            (&self.label_short, &self.label)
        };
        first
            .as_deref()
            .or(second.as_deref())
            .unwrap_or(&self.name)
    }
}

/// The declared shape of the data table: one dimension naming the region,
/// one measure carrying its value.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Schema {
    pub dimension: FieldMeta,
    pub measure: FieldMeta,
}
