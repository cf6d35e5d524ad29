//! Web Mercator helpers shared by the viewport and the tile renderer.

use std::f64::consts::PI;

pub const TILE_SIZE: u32 = 256;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Project to normalized world coordinates, both axes in `[0, 1]`, y growing south.
pub fn project(lon: f64, lat: f64) -> (f64, f64) {
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0;
    (x, y)
}

pub fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lon, lat)
}

/// Tiles per axis at `zoom`.
pub fn tile_count(zoom: u8) -> u32 {
    1u32 << zoom
}

pub fn lat_lon_to_tile_pixel(lat: f64, lon: f64, zoom: u8) -> (u32, u32, u32, u32) {
    let n = tile_count(zoom);
    let world_px = (n * TILE_SIZE) as f64;
    let (x, y) = project(lon, lat);
    // Global pixel, kept inside the grid so the east edge and south pole land in the last tile.
    let gx = ((x * world_px).max(0.0) as u32).min(n * TILE_SIZE - 1);
    let gy = ((y * world_px).max(0.0) as u32).min(n * TILE_SIZE - 1);

    (gx / TILE_SIZE, gy / TILE_SIZE, gx % TILE_SIZE, gy % TILE_SIZE)
}

/// Longitude and latitude at a (possibly fractional) pixel position inside tile (`tx`, `ty`).
pub fn tile_pixel_to_lon_lat(tx: u32, ty: u32, px: f64, py: f64, zoom: u8) -> (f64, f64) {
    let n = tile_count(zoom) as f64;
    let x = (tx as f64 + px / TILE_SIZE as f64) / n;
    let y = (ty as f64 + py / TILE_SIZE as f64) / n;
    unproject(x, y)
}
