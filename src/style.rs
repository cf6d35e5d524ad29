use crate::color::{ColorScale, Rgb};
use crate::config::VisConfig;
use crate::resolver::Resolution;
use crate::tooltip::{format_value, Tooltip};
use crate::types::{FieldMeta, RegionFeature};
use serde::{Serialize, Serializer};
use std::fmt;

const GRIDLINE_WEIGHT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    Transparent,
    Solid(Rgb),
}

impl fmt::Display for Paint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Paint::Transparent => f.write_str("transparent"),
            Paint::Solid(c) => write!(f, "{}", c),
        }
    }
}

impl Serialize for Paint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStyle {
    pub fill_color: Paint,
    pub color: Paint,
    pub weight: f64,
    pub fill_opacity: f64,
}

impl RegionStyle {
    const HIDDEN: RegionStyle = RegionStyle {
        fill_color: Paint::Transparent,
        color: Paint::Transparent,
        weight: 0.0,
        fill_opacity: 0.0,
    };
}

/// Resolved per-refresh inputs shared by every region's style.
pub struct Styler<'a> {
    pub scale: Option<&'a ColorScale>,
    pub options: &'a VisConfig,
    pub measure: &'a FieldMeta,
    pub no_data_color: Rgb,
}

impl<'a> Styler<'a> {
    pub fn style(&self, resolution: &Resolution) -> RegionStyle {
        match (resolution, self.scale) {
            (Resolution::Observed { value, .. }, Some(scale)) => {
                let color = Paint::Solid(scale.color_for(*value));
                RegionStyle {
                    fill_color: color,
                    color,
                    weight: if self.options.heatmap_gridlines {
                        GRIDLINE_WEIGHT
                    } else {
                        0.0
                    },
                    fill_opacity: self.options.fill_opacity,
                }
            }
            _ if self.options.show_gridlines_on_blank_regions => RegionStyle {
                color: Paint::Solid(self.no_data_color),
                weight: GRIDLINE_WEIGHT,
                ..RegionStyle::HIDDEN
            },
            _ => RegionStyle::HIDDEN,
        }
    }

    /// Only regions with data carry a tooltip.
    pub fn tooltip(&self, region: &RegionFeature, resolution: &Resolution) -> Option<Tooltip> {
        let value = resolution.value()?;
        let scale = self.scale?;
        let region_name = self
            .options
            .show_region_name_in_tooltip
            .then(|| region.name.clone());
        let region_color = self
            .options
            .region_name_color_matches_heatmap
            .then(|| scale.color_for(value));
        Some(Tooltip {
            region_name,
            region_color,
            measure_label: self
                .measure
                .display_label(self.options.show_full_measure_name)
                .to_string(),
            value_text: format_value(value),
        })
    }
}
