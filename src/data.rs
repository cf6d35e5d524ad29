use crate::config::InputConfig;
use crate::types::{Observation, RegionFeature, Schema};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use geo::MultiPolygon;
use shapefile::dbase::{FieldValue, Record};
use shapefile::Reader;
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{debug, info, warn};

/// Load the static region collection. The format follows the file extension.
pub fn load_regions(input: &InputConfig) -> Result<Vec<RegionFeature>> {
    let path = &input.regions;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Region file has no extension: {:?}", path))?;

    let regions = match extension.as_str() {
        "shp" => load_shapefile_regions(input)?,
        "json" | "geojson" => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
            read_geojson_regions(BufReader::new(file), input)?
        }
        _ => return Err(anyhow!("Unsupported region format: {}", extension)),
    };

    info!(count = regions.len(), path = ?path, "Loaded regions");
    Ok(regions)
}

pub fn read_geojson_regions<R: Read>(reader: R, input: &InputConfig) -> Result<Vec<RegionFeature>> {
    use geojson::GeoJson;

    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();
    for feature in collection.features {
        let property = |key: &str| {
            feature
                .properties
                .as_ref()
                .and_then(|props| props.get(key))
                .and_then(json_name)
        };

        let Some(name) = property(&input.name_property) else {
            debug!("Skipping feature without '{}'", input.name_property);
            continue;
        };
        let alias = property(&input.alias_property);

        let geometry = match feature.geometry {
            Some(geom) => {
                let geometry: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of '{}': {:?}", name, e))?;
                match geometry {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        debug!(region = %name, "Skipping non-polygon feature");
                        continue;
                    }
                }
            }
            None => continue,
        };

        regions.push(RegionFeature {
            name,
            alias,
            geometry,
        });
    }

    Ok(regions)
}

fn json_name(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn load_shapefile_regions(input: &InputConfig) -> Result<Vec<RegionFeature>> {
    let mut reader = Reader::from_path(&input.regions)
        .with_context(|| format!("Failed to open Shapefile: {:?}", input.regions))?;

    let mut regions = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name = match dbase_name(&record, &input.name_property)? {
            Some(name) => name,
            None => continue,
        };
        // The alias column is optional, but a present one must hold text.
        let alias = match record.get(&input.alias_property) {
            Some(_) => dbase_name(&record, &input.alias_property)?,
            None => None,
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        regions.push(RegionFeature {
            name,
            alias,
            geometry,
        });
    }

    Ok(regions)
}

fn dbase_name(record: &Record, field: &str) -> Result<Option<String>> {
    match record.get(field) {
        None => Err(anyhow!("Field '{}' not found in Shapefile", field)),
        Some(FieldValue::Character(Some(s))) if !s.trim().is_empty() => {
            Ok(Some(s.trim().to_string()))
        }
        Some(FieldValue::Character(_)) => Ok(None),
        Some(_) => Err(anyhow!("Shapefile field '{}' must be a string", field)),
    }
}

/// Column positions of the declared dimension and measure, looked up once
/// from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowAccessor {
    dimension: usize,
    measure: usize,
}

impl RowAccessor {
    pub fn resolve(schema: &Schema, headers: &StringRecord) -> Result<Self> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| anyhow!("Column '{}' not found in data table", name))
        };
        Ok(Self {
            dimension: position(&schema.dimension.name)?,
            measure: position(&schema.measure.name)?,
        })
    }

    /// `row` is the 1-based data row number, used in error messages.
    pub fn observation(&self, record: &StringRecord, row: usize) -> Result<Observation> {
        let region = record.get(self.dimension).unwrap_or("").trim();
        let raw = record.get(self.measure).unwrap_or("").trim();
        let value = parse_measure(raw)
            .ok_or_else(|| anyhow!("Row {}: measure value '{}' is not a number", row, raw))?;
        if !value.is_finite() {
            return Err(anyhow!("Row {}: measure value '{}' is not finite", row, raw));
        }
        Ok(Observation::new(region, value))
    }
}

/// Parse a measure cell. Commas are accepted only as thousands separators,
/// so `1,200.5` reads as 1200.5 but `1,2,3` is rejected.
fn parse_measure(raw: &str) -> Option<f64> {
    if !raw.contains(',') {
        return raw.parse().ok();
    }
    let unsigned = raw.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(raw);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if frac.contains(',') {
        return None;
    }
    let mut groups = int.split(',');
    let leading = groups.next().is_some_and(|g| (1..=3).contains(&g.len()));
    if !leading || !groups.all(|g| g.len() == 3) {
        return None;
    }
    raw.replace(',', "").parse().ok()
}

pub fn load_observations(input: &InputConfig) -> Result<Vec<Observation>> {
    let file = File::open(&input.data_csv)
        .with_context(|| format!("Failed to open CSV file: {:?}", input.data_csv))?;
    let observations = read_observations(file, &input.schema())?;
    info!(count = observations.len(), path = ?input.data_csv, "Loaded observations");
    Ok(observations)
}

pub fn read_observations<R: Read>(reader: R, schema: &Schema) -> Result<Vec<Observation>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    let accessor = RowAccessor::resolve(schema, &headers)?;

    let mut observations = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let observation = accessor.observation(&record, i + 1)?;
        if observation.region.is_empty() {
            warn!(row = i + 1, "Row has an empty dimension value");
        }
        observations.push(observation);
    }
    Ok(observations)
}
