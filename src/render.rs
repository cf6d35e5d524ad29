use crate::color::Rgb;
use crate::config::OutputConfig;
use crate::mercator::{self, lat_lon_to_tile_pixel, tile_pixel_to_lon_lat, TILE_SIZE};
use crate::style::Paint;
use crate::view::{Frame, StyledRegion};
use anyhow::{Context, Result};
use geo::algorithm::contains::Contains;
use geo::{coord, BoundingRect, MultiPolygon, Point, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Write the styled layer, the legend, the fitted camera and (if enabled) the tile pyramid.
pub fn write_outputs(frame: &Frame, output: &OutputConfig) -> Result<()> {
    fs::create_dir_all(&output.dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output.dir))?;

    write_layer(frame, &output.dir.join("regions.geojson"))?;
    write_legend(frame, &output.dir)?;

    let camera = frame.camera(output.viewport_width, output.viewport_height);
    let viewport = json!({ "viewport": frame.viewport, "camera": camera });
    fs::write(
        output.dir.join("viewport.json"),
        serde_json::to_string_pretty(&viewport)?,
    )
    .context("Failed to write viewport.json")?;

    if output.tiles {
        generate_tiles(frame, &output.tile_dir(), output.tile_max_zoom)?;
    }
    Ok(())
}

pub fn layer_collection(frame: &Frame) -> Result<FeatureCollection> {
    let features = frame
        .regions
        .iter()
        .map(|region| -> Result<Feature> {
            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), json!(region.name));
            properties.insert("key".to_string(), json!(region.key));
            properties.insert("value".to_string(), json!(region.value));
            if let Value::Object(style) = serde_json::to_value(region.style)? {
                properties.extend(style);
            }
            if let Some(tooltip) = &region.tooltip {
                properties.insert("tooltipContent".to_string(), json!(tooltip.to_html()));
            }
            Ok(Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&region.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn write_layer(frame: &Frame, path: &Path) -> Result<()> {
    let collection = layer_collection(frame)?;
    fs::write(path, serde_json::to_string(&collection)?)
        .with_context(|| format!("Failed to write layer: {:?}", path))?;
    info!(features = collection.features.len(), path = ?path, "Wrote layer");
    Ok(())
}

pub fn write_legend(frame: &Frame, dir: &Path) -> Result<()> {
    let Some(legend) = &frame.legend else {
        warn!("No observations, skipping legend");
        return Ok(());
    };
    fs::write(dir.join("legend.html"), legend.to_html()).context("Failed to write legend.html")?;
    fs::write(dir.join("legend.json"), serde_json::to_string_pretty(legend)?)
        .context("Failed to write legend.json")?;
    Ok(())
}

/// Render `tiles/{z}/{x}/{y}.png` for every zoom in the viewport's range,
/// stopping at `tile_max_zoom`. Only tiles that overlap the layer and end up
/// non-empty are written. Returns the number of tiles written.
pub fn generate_tiles(frame: &Frame, tile_dir: &Path, tile_max_zoom: u8) -> Result<usize> {
    let Some(bounds) = frame.bounds else {
        warn!("Layer is empty, no tiles to render");
        return Ok(0);
    };
    let min_zoom = frame.viewport.min_zoom.floor() as u8;
    let max_zoom = (frame.viewport.max_zoom.ceil() as u8).min(tile_max_zoom);
    if max_zoom < min_zoom {
        warn!(min_zoom, tile_max_zoom, "tile_max_zoom is below min_zoom, no tiles to render");
        return Ok(0);
    }
    info!("Generating tiles from min_zoom {} to max_zoom {}...", min_zoom, max_zoom);

    let mut written = 0;
    for z in min_zoom..=max_zoom {
        let (x0, y0, _, _) = lat_lon_to_tile_pixel(bounds.max().y, bounds.min().x, z);
        let (x1, y1, _, _) = lat_lon_to_tile_pixel(bounds.min().y, bounds.max().x, z);
        written += (x0..=x1)
            .into_par_iter()
            .flat_map_iter(|x| (y0..=y1).map(move |y| (x, y)))
            .map(|(x, y)| -> Result<usize> {
                let Some(img) = render_tile(frame, z, x, y) else {
                    return Ok(0);
                };
                let x_dir = tile_dir.join(z.to_string()).join(x.to_string());
                fs::create_dir_all(&x_dir).context("Failed to create tile directory")?;
                let path = x_dir.join(format!("{}.png", y));
                img.save(&path)
                    .with_context(|| format!("Failed to save tile {:?}", path))?;
                Ok(1)
            })
            .sum::<Result<usize>>()?;
        debug!(zoom = z, tiles = written, "Zoom level done");
    }

    info!(tiles = written, "Tile generation complete");
    Ok(written)
}

/// Rasterize one tile. `None` when nothing visible falls inside it.
pub fn render_tile(frame: &Frame, zoom: u8, tx: u32, ty: u32) -> Option<RgbaImage> {
    let size = TILE_SIZE as f64;
    let (west, north) = tile_pixel_to_lon_lat(tx, ty, 0.0, 0.0, zoom);
    let (east, south) = tile_pixel_to_lon_lat(tx, ty, size, size, zoom);
    let extent = Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north });

    let regions: Vec<&StyledRegion> = frame
        .regions_in(extent)
        .into_iter()
        .filter(|r| is_visible(r))
        .collect();
    if regions.is_empty() {
        return None;
    }

    let fills: Vec<Fill> = regions.iter().filter_map(|r| Fill::new(r)).collect();
    let mut img: RgbaImage = ImageBuffer::new(TILE_SIZE, TILE_SIZE);

    for py in 0..TILE_SIZE {
        for px in 0..TILE_SIZE {
            let (lon, lat) = tile_pixel_to_lon_lat(tx, ty, px as f64 + 0.5, py as f64 + 0.5, zoom);
            let point = Point::new(lon, lat);
            for fill in &fills {
                if fill.covers(point) {
                    blend(img.get_pixel_mut(px, py), fill.color, fill.opacity);
                }
            }
        }
    }

    for region in &regions {
        if let Paint::Solid(stroke) = region.style.color {
            if region.style.weight > 0.0 {
                draw_outline(&mut img, region, stroke, zoom, tx, ty);
            }
        }
    }

    let painted = img.pixels().any(|p| p[3] > 0);
    painted.then_some(img)
}

/// A filled region with its bounding box, so most pixels skip the exact test.
struct Fill<'a> {
    color: Rgb,
    opacity: f64,
    bbox: Rect<f64>,
    geometry: &'a MultiPolygon<f64>,
}

impl<'a> Fill<'a> {
    fn new(region: &'a StyledRegion) -> Option<Self> {
        let Paint::Solid(color) = region.style.fill_color else {
            return None;
        };
        if region.style.fill_opacity <= 0.0 {
            return None;
        }
        Some(Self {
            color,
            opacity: region.style.fill_opacity,
            bbox: region.geometry.bounding_rect()?,
            geometry: &region.geometry,
        })
    }

    fn covers(&self, point: Point<f64>) -> bool {
        let (min, max) = (self.bbox.min(), self.bbox.max());
        let in_bbox = (min.x..=max.x).contains(&point.x()) && (min.y..=max.y).contains(&point.y());
        in_bbox && self.geometry.contains(&point)
    }
}

fn is_visible(region: &StyledRegion) -> bool {
    let filled = region.style.fill_color != Paint::Transparent && region.style.fill_opacity > 0.0;
    let stroked = region.style.color != Paint::Transparent && region.style.weight > 0.0;
    filled || stroked
}

fn draw_outline(img: &mut RgbaImage, region: &StyledRegion, color: Rgb, zoom: u8, tx: u32, ty: u32) {
    let world_px = (mercator::tile_count(zoom) * TILE_SIZE) as f64;
    let to_tile = |c: geo::Coord<f64>| {
        let (x, y) = mercator::project(c.x, c.y);
        (
            x * world_px - (tx * TILE_SIZE) as f64,
            y * world_px - (ty * TILE_SIZE) as f64,
        )
    };
    let half = region.style.weight / 2.0;

    for polygon in &region.geometry {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
        for line in rings.flat_map(|ring| ring.lines()) {
            let (x0, y0) = to_tile(line.start);
            let (x1, y1) = to_tile(line.end);
            let steps = ((x1 - x0).hypot(y1 - y0) * 2.0).ceil().max(1.0) as usize;
            for i in 0..=steps {
                let t = i as f64 / steps as f64;
                stamp(img, x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, half, color);
            }
        }
    }
}

/// Paint a square brush of half-width `half` centered on (`x`, `y`).
fn stamp(img: &mut RgbaImage, x: f64, y: f64, half: f64, color: Rgb) {
    let size = TILE_SIZE as f64;
    if x + half < 0.0 || y + half < 0.0 || x - half >= size || y - half >= size {
        return;
    }
    let (xa, xb) = ((x - half).max(0.0) as u32, ((x + half).min(size - 1.0)) as u32);
    let (ya, yb) = ((y - half).max(0.0) as u32, ((y + half).min(size - 1.0)) as u32);
    for py in ya..=yb {
        for px in xa..=xb {
            img.put_pixel(px, py, Rgba([color.r, color.g, color.b, 255]));
        }
    }
}

/// Source-over composite of `color` at `alpha` onto `dst`.
fn blend(dst: &mut Rgba<u8>, color: Rgb, alpha: f64) {
    let dst_a = dst[3] as f64 / 255.0;
    let out_a = alpha + dst_a * (1.0 - alpha);
    if out_a <= 0.0 {
        return;
    }
    let mix = |src: u8, d: u8| {
        ((src as f64 * alpha + d as f64 * dst_a * (1.0 - alpha)) / out_a).round() as u8
    };
    *dst = Rgba([
        mix(color.r, dst[0]),
        mix(color.g, dst[1]),
        mix(color.b, dst[2]),
        (out_a * 255.0).round() as u8,
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VisConfig;
    use crate::types::{FieldMeta, Observation, RegionFeature};
    use crate::view::MapView;
    use geo::{polygon, MultiPolygon};

    fn field() -> FieldMeta {
        FieldMeta {
            name: "country".to_string(),
            label: Some("Revenue".to_string()),
            label_short: None,
        }
    }

    fn square(name: &str, x: f64, y: f64, size: f64) -> RegionFeature {
        RegionFeature {
            name: name.to_string(),
            alias: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: x, y: y),
                (x: x + size, y: y),
                (x: x + size, y: y + size),
                (x: x, y: y + size),
                (x: x, y: y),
            ]]),
        }
    }

    fn options() -> VisConfig {
        VisConfig {
            fill_opacity: 1.0,
            min_zoom: 0.0,
            max_zoom: 1.0,
            color_scale: "#000000, #ffffff".to_string(),
            ..VisConfig::default()
        }
    }

    fn render(view: &mut MapView, obs: &[Observation], options: &VisConfig) -> Frame {
        view.refresh(obs, options, &field(), |_| {}).unwrap();
        let frame = std::mem::replace(view, MapView::new(Vec::new(), field()));
        frame.into_frame().unwrap()
    }

    #[test]
    fn test_blend() {
        let mut px = Rgba([0, 0, 0, 0]);
        blend(&mut px, Rgb::new(200, 100, 0), 0.5);
        assert_eq!(px, Rgba([200, 100, 0, 128]));

        let mut px = Rgba([0, 0, 255, 255]);
        blend(&mut px, Rgb::new(255, 0, 0), 1.0);
        assert_eq!(px, Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_layer_collection_properties() {
        let mut view = MapView::new(
            vec![square("A", 0.0, 0.0, 10.0), square("B", 10.0, 0.0, 10.0)],
            field(),
        );
        let options = VisConfig {
            show_gridlines_on_blank_regions: true,
            ..options()
        };
        let frame = render(&mut view, &[Observation::new("A", 5.0)], &options);
        let collection = layer_collection(&frame).unwrap();
        assert_eq!(collection.features.len(), 2);

        let a = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(a["name"], json!("A"));
        assert_eq!(a["value"], json!(5.0));
        assert_eq!(a["fillColor"], json!("#ffffff"));
        assert_eq!(a["fillOpacity"], json!(1.0));
        assert!(a["tooltipContent"].as_str().unwrap().contains("tooltip-value"));

        let b = collection.features[1].properties.as_ref().unwrap();
        assert_eq!(b["fillColor"], json!("transparent"));
        assert_eq!(b["color"], json!("#cccccc"));
        assert_eq!(b["key"], Value::Null);
        assert!(!b.contains_key("tooltipContent"));
    }

    #[test]
    fn test_generate_tiles() {
        let mut view = MapView::new(vec![square("A", -10.0, -10.0, 20.0)], field());
        let frame = render(&mut view, &[Observation::new("A", 1.0)], &options());

        let dir = tempfile::tempdir().unwrap();
        let written = generate_tiles(&frame, dir.path(), 6).unwrap();
        assert_eq!(written, 5);

        let tile = image::open(dir.path().join("0/0/0.png")).unwrap().to_rgba8();
        assert_eq!(*tile.get_pixel(128, 128), Rgba([255, 255, 255, 255]));
        assert_eq!(tile.get_pixel(0, 0)[3], 0);
        assert!(dir.path().join("1/1/1.png").exists());
    }

    #[test]
    fn test_generate_tiles_stops_at_tile_max_zoom() {
        let regions = || vec![square("A", -10.0, -10.0, 20.0)];
        let deep = VisConfig {
            max_zoom: 22.0,
            ..options()
        };
        let mut view = MapView::new(regions(), field());
        let frame = render(&mut view, &[Observation::new("A", 1.0)], &deep);

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(generate_tiles(&frame, dir.path(), 1).unwrap(), 5);
        assert!(!dir.path().join("2").exists());

        let shallow_cap = VisConfig {
            min_zoom: 3.0,
            max_zoom: 4.0,
            ..options()
        };
        let mut view = MapView::new(regions(), field());
        let frame = render(&mut view, &[Observation::new("A", 1.0)], &shallow_cap);
        assert_eq!(generate_tiles(&frame, dir.path(), 2).unwrap(), 0);
    }

    #[test]
    fn test_fill_checks_bbox_before_geometry() {
        // An L shape: its bbox corner lies outside the polygon.
        let region = RegionFeature {
            name: "L".to_string(),
            alias: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 5.0),
                (x: 5.0, y: 5.0),
                (x: 5.0, y: 10.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ]]),
        };
        let mut view = MapView::new(vec![region], field());
        let frame = render(&mut view, &[Observation::new("L", 1.0)], &options());
        let fill = Fill::new(&frame.regions[0]).unwrap();

        assert!(fill.covers(Point::new(2.0, 2.0)));
        assert!(!fill.covers(Point::new(8.0, 8.0)));
        assert!(!fill.covers(Point::new(20.0, 2.0)));
        assert!(!fill.covers(Point::new(-1.0, -1.0)));

        let transparent = StyledRegion {
            style: crate::style::RegionStyle {
                fill_opacity: 0.0,
                ..frame.regions[0].style
            },
            ..frame.regions[0].clone()
        };
        assert!(Fill::new(&transparent).is_none());
    }

    #[test]
    fn test_outline_only_tile() {
        let mut view = MapView::new(vec![square("A", -10.0, -10.0, 20.0)], field());
        let options = VisConfig {
            fill_opacity: 0.0,
            heatmap_gridlines: true,
            ..options()
        };
        let frame = render(&mut view, &[Observation::new("A", 1.0)], &options);
        let tile = render_tile(&frame, 0, 0, 0).unwrap();
        assert_eq!(tile.get_pixel(128, 128)[3], 0);
        let (_, _, px, py) = lat_lon_to_tile_pixel(0.0, -10.0, 0);
        assert_eq!(tile.get_pixel(px, py)[3], 255);
    }

    #[test]
    fn test_write_outputs() {
        let mut view = MapView::new(vec![square("A", 0.0, 0.0, 10.0)], field());
        let frame = render(&mut view, &[Observation::new("A", 1.0)], &options());
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            dir: dir.path().join("out"),
            tiles: false,
            tile_max_zoom: 6,
            viewport_width: 800,
            viewport_height: 600,
        };
        write_outputs(&frame, &output).unwrap();
        for file in ["regions.geojson", "legend.html", "legend.json", "viewport.json"] {
            assert!(output.dir.join(file).exists(), "{}", file);
        }
        assert!(!output.tile_dir().exists());

        let viewport: Value =
            serde_json::from_str(&fs::read_to_string(output.dir.join("viewport.json")).unwrap())
                .unwrap();
        assert_eq!(viewport["camera"]["zoom"], json!(1.0));
    }
}
