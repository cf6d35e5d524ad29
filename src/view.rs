//! The map session. A `MapView` holds the static geography and the frame
//! produced by the latest refresh; every refresh builds a new frame and
//! drops the old one.

use crate::color::{ColorScale, Domain};
use crate::config::VisConfig;
use crate::crossfilter::CrossfilterEvent;
use crate::legend::Legend;
use crate::mercator::{self, MAX_LATITUDE, TILE_SIZE};
use crate::resolver::{resolve, Resolution};
use crate::style::{RegionStyle, Styler};
use crate::tooltip::Tooltip;
use crate::types::{FieldMeta, Observation, RegionFeature};
use anyhow::Result;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{coord, MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct StyledRegion {
    pub name: String,
    /// Name the data matched on; `None` for regions without data.
    pub key: Option<String>,
    pub value: Option<f64>,
    pub style: RegionStyle,
    pub tooltip: Option<Tooltip>,
    pub geometry: MultiPolygon<f64>,
}

// Wrapper for RTree indexing
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct Frame {
    pub regions: Vec<StyledRegion>,
    /// Absent when the refresh had no observations.
    pub legend: Option<Legend>,
    pub bounds: Option<Rect<f64>>,
    pub viewport: Viewport,
    dimension_field: String,
    crossfilter_enabled: bool,
    index: RTree<RegionEnvelope>,
}

impl Frame {
    fn new(
        regions: Vec<StyledRegion>,
        legend: Option<Legend>,
        viewport: Viewport,
        dimension_field: String,
        crossfilter_enabled: bool,
    ) -> Self {
        let rects: Vec<Option<Rect<f64>>> =
            regions.iter().map(|r| r.geometry.bounding_rect()).collect();

        let items = rects
            .iter()
            .enumerate()
            .filter_map(|(index, rect)| {
                rect.map(|rect| RegionEnvelope {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        let bounds = rects.into_iter().flatten().reduce(|a, b| {
            Rect::new(
                coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        });

        Self {
            regions,
            legend,
            bounds,
            viewport,
            dimension_field,
            crossfilter_enabled,
            index: RTree::bulk_load(items),
        }
    }

    pub fn observed(&self) -> impl Iterator<Item = &StyledRegion> {
        self.regions.iter().filter(|r| r.key.is_some())
    }

    /// Topmost region containing the point. Later regions draw over earlier ones.
    pub fn region_at(&self, lon: f64, lat: f64) -> Option<&StyledRegion> {
        let point = Point::new(lon, lat);
        self.index
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .filter(|candidate| self.regions[candidate.index].geometry.contains(&point))
            .map(|candidate| candidate.index)
            .max()
            .map(|i| &self.regions[i])
    }

    /// Regions whose bounding box intersects `rect`, in draw order.
    pub fn regions_in(&self, rect: Rect<f64>) -> Vec<&StyledRegion> {
        let envelope =
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let mut hits: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&envelope)
            .map(|c| c.index)
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.regions[i]).collect()
    }

    /// Crossfilter event for a click at the point. Only regions with data react.
    pub fn click(&self, lon: f64, lat: f64) -> Option<CrossfilterEvent> {
        if !self.crossfilter_enabled {
            return None;
        }
        let key = self.region_at(lon, lat)?.key.clone()?;
        Some(CrossfilterEvent {
            field: self.dimension_field.clone(),
            value: key,
        })
    }

    /// Camera that fits the layer into a `width` x `height` pixel viewport.
    pub fn camera(&self, width: u32, height: u32) -> Option<Camera> {
        self.bounds.map(|b| self.viewport.fit(b, width, height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_enabled: bool,
    pub pan_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Camera {
    pub center_lon: f64,
    pub center_lat: f64,
    pub zoom: f64,
}

impl Viewport {
    pub fn from_options(options: &VisConfig) -> Self {
        Self {
            min_zoom: options.min_zoom,
            max_zoom: options.max_zoom,
            zoom_enabled: options.enable_zoom,
            pan_enabled: options.enable_pan,
        }
    }

    /// The map cannot be panned past the world edges.
    pub fn max_bounds() -> Rect<f64> {
        Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 })
    }

    /// Center on `bounds` and pick the deepest whole zoom at which they fit,
    /// clamped to the configured range.
    pub fn fit(&self, bounds: Rect<f64>, width: u32, height: u32) -> Camera {
        let world = Self::max_bounds();
        let min_lon = bounds.min().x.max(world.min().x);
        let max_lon = bounds.max().x.min(world.max().x);
        let min_lat = bounds.min().y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let max_lat = bounds.max().y.clamp(-MAX_LATITUDE, MAX_LATITUDE);

        let (x0, y0) = mercator::project(min_lon, max_lat);
        let (x1, y1) = mercator::project(max_lon, min_lat);
        let (dx, dy) = ((x1 - x0).abs(), (y1 - y0).abs());

        let fit_axis = |pixels: u32, span: f64| {
            if span > 0.0 {
                (pixels as f64 / (TILE_SIZE as f64 * span)).log2()
            } else {
                f64::INFINITY
            }
        };
        let zoom = fit_axis(width, dx).min(fit_axis(height, dy));
        let zoom = if zoom.is_finite() {
            zoom.floor().clamp(self.min_zoom, self.max_zoom)
        } else {
            self.max_zoom
        };

        let (center_lon, center_lat) = mercator::unproject((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        Camera {
            center_lon,
            center_lat,
            zoom,
        }
    }
}

pub struct MapView {
    regions: Vec<RegionFeature>,
    dimension: FieldMeta,
    frame: Option<Frame>,
}

impl MapView {
    pub fn new(regions: Vec<RegionFeature>, dimension: FieldMeta) -> Self {
        Self {
            regions,
            dimension,
            frame: None,
        }
    }

    pub fn into_frame(self) -> Option<Frame> {
        self.frame
    }

    /// Rebuild the layer and legend from `observations`, replace the current
    /// frame, then hand the new frame to `done`.
    pub fn refresh<F>(
        &mut self,
        observations: &[Observation],
        options: &VisConfig,
        measure: &FieldMeta,
        done: F,
    ) -> Result<&Frame>
    where
        F: FnOnce(&Frame),
    {
        let resolved = resolve(
            &self.regions,
            observations,
            options.show_gridlines_on_blank_regions,
        );

        // The domain covers every row, matched to a region or not.
        let domain = Domain::from_values(observations.iter().map(|o| o.value));
        let scale = domain
            .map(|d| ColorScale::from_list(&options.color_scale, d, options.reverse_colors))
            .transpose()?;
        if let Some(d) = domain {
            debug!(min = d.min, max = d.max, "Color domain");
        }

        let styler = Styler {
            scale: scale.as_ref(),
            options,
            measure,
            no_data_color: options.no_data_gridline_color()?,
        };

        let regions: Vec<StyledRegion> = resolved
            .iter()
            .map(|r| {
                let (key, value) = match &r.resolution {
                    Resolution::Observed { key, value } => (Some(key.clone()), Some(*value)),
                    Resolution::NoData => (None, None),
                };
                StyledRegion {
                    name: r.region.name.clone(),
                    key,
                    value,
                    style: styler.style(&r.resolution),
                    tooltip: styler.tooltip(r.region, &r.resolution),
                    geometry: r.region.geometry.clone(),
                }
            })
            .collect();

        let legend = scale
            .as_ref()
            .map(|s| Legend::build(s, measure.display_label(options.show_full_measure_name)));

        let frame = Frame::new(
            regions,
            legend,
            Viewport::from_options(options),
            self.dimension.name.clone(),
            options.crossfilter_enabled,
        );
        info!(
            observations = observations.len(),
            regions = frame.regions.len(),
            with_data = frame.observed().count(),
            "Map layer rebuilt"
        );

        let frame: &Frame = self.frame.insert(frame);
        done(frame);
        Ok(frame)
    }
}
