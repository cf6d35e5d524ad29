//! Matches observations to static regions by primary name, then alias.

use crate::types::{Observation, RegionFeature};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// `key` is whichever of the region's names the data used.
    Observed { key: String, value: f64 },
    NoData,
}

impl Resolution {
    pub fn has_data(&self) -> bool {
        matches!(self, Resolution::Observed { .. })
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Resolution::Observed { value, .. } => Some(*value),
            Resolution::NoData => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRegion<'a> {
    pub region: &'a RegionFeature,
    pub resolution: Resolution,
}

/// Region name to value. Later observations overwrite earlier ones for the same name.
#[derive(Debug, Default)]
pub struct ObservationIndex {
    values: HashMap<String, f64>,
}

impl ObservationIndex {
    pub fn build(observations: &[Observation]) -> Self {
        let values = observations
            .iter()
            .map(|o| (o.region.clone(), o.value))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn lookup(&self, region: &RegionFeature) -> Resolution {
        let primary = self
            .get(&region.name)
            .map(|value| (region.name.as_str(), value));
        let alias = || {
            region
                .alias
                .as_deref()
                .and_then(|alias| self.get(alias).map(|value| (alias, value)))
        };
        match primary.or_else(alias) {
            Some((key, value)) => Resolution::Observed {
                key: key.to_string(),
                value,
            },
            None => Resolution::NoData,
        }
    }
}

/// Label every region with its observation. Unmatched regions are dropped
/// unless `keep_blank` is set, in which case they come back as `NoData`.
/// Output keeps the order of `regions`.
pub fn resolve<'a>(
    regions: &'a [RegionFeature],
    observations: &[Observation],
    keep_blank: bool,
) -> Vec<ResolvedRegion<'a>> {
    let index = ObservationIndex::build(observations);
    regions
        .iter()
        .map(|region| ResolvedRegion {
            region,
            resolution: index.lookup(region),
        })
        .filter(|r| keep_blank || r.resolution.has_data())
        .collect()
}
