use crate::color::{parse_color_list, Rgb};
use crate::types::{FieldMeta, Schema};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Deepest zoom the tile grid supports.
pub const MAX_ZOOM: f64 = 22.0;

/// Deepest zoom `render` will pre-render tiles for. Each level quadruples the tile count.
pub const MAX_TILE_ZOOM: u8 = 10;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub visualization: VisConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub regions: PathBuf, // .geojson/.json or .shp
    pub data_csv: PathBuf,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default = "default_alias_property")]
    pub alias_property: String,
    pub dimension: FieldMeta,
    pub measure: FieldMeta,
}

impl InputConfig {
    pub fn schema(&self) -> Schema {
        Schema {
            dimension: self.dimension.clone(),
            measure: self.measure.clone(),
        }
    }
}

/// Display options. Every field has the default the dashboard shipped with.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VisConfig {
    pub fill_opacity: f64,
    pub heatmap_gridlines: bool,
    pub show_gridlines_on_blank_regions: bool,
    pub no_data_gridline_color: String,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub show_region_name_in_tooltip: bool,
    pub region_name_color_matches_heatmap: bool,
    pub show_full_measure_name: bool,
    pub color_scale: String,
    pub reverse_colors: bool,
    pub crossfilter_enabled: bool,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            fill_opacity: 0.8,
            heatmap_gridlines: false,
            show_gridlines_on_blank_regions: false,
            no_data_gridline_color: "#ccc".to_string(),
            enable_zoom: true,
            enable_pan: true,
            min_zoom: 2.0,
            max_zoom: 4.0,
            show_region_name_in_tooltip: true,
            region_name_color_matches_heatmap: true,
            show_full_measure_name: false,
            color_scale: "#EB8230, #EB8C00, #FFB600".to_string(),
            reverse_colors: false,
            crossfilter_enabled: false,
        }
    }
}

impl VisConfig {
    /// Reject option values that would otherwise fail halfway through a refresh.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fill_opacity) {
            return Err(anyhow!(
                "fill_opacity must be between 0 and 1, got {}",
                self.fill_opacity
            ));
        }
        if self.min_zoom > self.max_zoom {
            return Err(anyhow!(
                "min_zoom ({}) is greater than max_zoom ({})",
                self.min_zoom,
                self.max_zoom
            ));
        }
        if self.min_zoom < 0.0 || self.max_zoom > MAX_ZOOM {
            return Err(anyhow!("zoom levels must lie within 0..={}", MAX_ZOOM));
        }
        parse_color_list(&self.color_scale).context("Invalid color_scale")?;
        self.no_data_gridline_color()?;
        Ok(())
    }

    pub fn no_data_gridline_color(&self) -> Result<Rgb> {
        let color = self.no_data_gridline_color.trim();
        let color = if color.is_empty() { "#ccc" } else { color };
        color
            .parse()
            .with_context(|| "Invalid no_data_gridline_color")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub tiles: bool,
    /// Tiles are rendered up to the lesser of this and `visualization.max_zoom`.
    #[serde(default = "default_tile_max_zoom")]
    pub tile_max_zoom: u8,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

impl OutputConfig {
    pub fn tile_dir(&self) -> PathBuf {
        self.dir.join("tiles")
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_max_zoom > MAX_TILE_ZOOM {
            return Err(anyhow!(
                "tile_max_zoom ({}) exceeds the pre-render limit of {}",
                self.tile_max_zoom,
                MAX_TILE_ZOOM
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

fn default_name_property() -> String {
    "name".to_string()
}

fn default_alias_property() -> String {
    "name2".to_string()
}

fn default_true() -> bool {
    true
}

fn default_tile_max_zoom() -> u8 {
    6
}

fn default_viewport_width() -> u32 {
    1024
}

fn default_viewport_height() -> u32 {
    768
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        config.visualization.validate()?;
        config.output.validate()?;
        Ok(config)
    }
}
