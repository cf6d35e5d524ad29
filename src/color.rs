//! Continuous color scales over a numeric domain.
//!
//! Stops are spaced evenly across `[min, max]` and interpolated linearly per
//! RGB channel. Values outside the domain clamp to the end stops.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of gradient samples drawn in the legend bar.
pub const LEGEND_STEPS: usize = 101;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("color scale has no colors")]
    EmptyScale,
    #[error("invalid color '{0}': expected #rgb or #rrggbb")]
    InvalidHex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ColorError::InvalidHex(s.to_string());
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                // #abc is shorthand for #aabbcc
                let expand = |i: usize| channel(&hex[i..i + 1].repeat(2));
                Ok(Rgb::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Rgb::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a comma-separated color list such as `"#EB8230, #EB8C00, #FFB600"`.
pub fn parse_color_list(list: &str) -> Result<Vec<Rgb>, ColorError> {
    if list.trim().is_empty() {
        return Err(ColorError::EmptyScale);
    }
    list.split(',').map(|c| c.trim().parse()).collect()
}

/// Closed numeric range the scale is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
}

impl Domain {
    /// Single pass over `values`. `None` when there is nothing to scan.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Domain> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Domain { min: v, max: v }),
            Some(d) => Some(Domain {
                min: d.min.min(v),
                max: d.max.max(v),
            }),
        })
    }

    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }

    /// Position of `value` in the domain, clamped to `[0, 1]`.
    /// A degenerate domain places everything at the top.
    fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            return 1.0;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct ColorScale {
    stops: Vec<Rgb>,
    domain: Domain,
}

impl ColorScale {
    pub fn new(mut stops: Vec<Rgb>, domain: Domain, reversed: bool) -> Result<Self, ColorError> {
        if stops.is_empty() {
            return Err(ColorError::EmptyScale);
        }
        if reversed {
            stops.reverse();
        }
        Ok(Self { stops, domain })
    }

    /// Build straight from the configured comma-separated list.
    pub fn from_list(list: &str, domain: Domain, reversed: bool) -> Result<Self, ColorError> {
        Self::new(parse_color_list(list)?, domain, reversed)
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn color_for(&self, value: f64) -> Rgb {
        let last = self.stops.len() - 1;
        if last == 0 {
            return self.stops[0];
        }
        let pos = self.domain.normalize(value) * last as f64;
        let i = (pos.floor() as usize).min(last - 1);
        self.stops[i].lerp(self.stops[i + 1], pos - i as f64)
    }

    /// `n` colors sampled evenly from `min` to `max` inclusive.
    pub fn legend_steps(&self, n: usize) -> Vec<Rgb> {
        self.sample_values(n)
            .into_iter()
            .map(|v| self.color_for(v))
            .collect()
    }

    /// The domain values `legend_steps` samples at.
    pub fn sample_values(&self, n: usize) -> Vec<f64> {
        let Domain { min, max } = self.domain;
        match n {
            0 => Vec::new(),
            1 => vec![min],
            _ => (0..n)
                .map(|i| min + (max - min) * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb = Rgb::new(0, 0, 0);
    const WHITE: Rgb = Rgb::new(255, 255, 255);

    fn black_white(min: f64, max: f64) -> ColorScale {
        ColorScale::new(vec![BLACK, WHITE], Domain { min, max }, false).unwrap()
    }

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!("#EB8230".parse::<Rgb>().unwrap(), Rgb::new(0xeb, 0x82, 0x30));
        assert_eq!("ffb600".parse::<Rgb>().unwrap(), Rgb::new(0xff, 0xb6, 0x00));
        assert_eq!("#ccc".parse::<Rgb>().unwrap(), Rgb::new(0xcc, 0xcc, 0xcc));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("#12345".parse::<Rgb>(), Err(ColorError::InvalidHex(_))));
        assert!(matches!("red".parse::<Rgb>(), Err(ColorError::InvalidHex(_))));
        assert!(matches!("#gg0000".parse::<Rgb>(), Err(ColorError::InvalidHex(_))));
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        assert_eq!(Rgb::new(0xEB, 0x82, 0x30).to_string(), "#eb8230");
    }

    #[test]
    fn test_parse_color_list_trims() {
        let colors = parse_color_list("#EB8230, #EB8C00 ,#FFB600").unwrap();
        assert_eq!(colors.len(), 3);
        assert_eq!(colors[1], Rgb::new(0xeb, 0x8c, 0x00));
    }

    #[test]
    fn test_parse_color_list_errors() {
        assert_eq!(parse_color_list("  "), Err(ColorError::EmptyScale));
        assert!(matches!(parse_color_list("#000000,,#ffffff"), Err(ColorError::InvalidHex(_))));
    }

    #[test]
    fn test_domain_scan() {
        let d = Domain::from_values([10.0, 30.0, 20.0, -5.0]).unwrap();
        assert_eq!(d, Domain { min: -5.0, max: 30.0 });
        assert!(Domain::from_values(std::iter::empty()).is_none());
    }

    #[test]
    fn test_domain_bounds_every_value() {
        let values = [3.5, -1.0, 7.25, 0.0, 7.25, 2.0];
        let d = Domain::from_values(values).unwrap();
        assert!(values.iter().all(|&v| d.min <= v && v <= d.max));
    }

    #[test]
    fn test_black_white_midpoint() {
        let scale = black_white(10.0, 30.0);
        assert_eq!(scale.color_for(10.0).to_string(), "#000000");
        assert_eq!(scale.color_for(30.0).to_string(), "#ffffff");
        assert_eq!(scale.color_for(20.0).to_string(), "#808080");
    }

    #[test]
    fn test_out_of_domain_clamps() {
        let scale = black_white(10.0, 30.0);
        assert_eq!(scale.color_for(-100.0), BLACK);
        assert_eq!(scale.color_for(1e9), WHITE);
    }

    #[test]
    fn test_reversed_endpoints() {
        let scale = ColorScale::from_list("#EB8230, #EB8C00, #FFB600", Domain { min: 0.0, max: 1.0 }, true)
            .unwrap();
        assert_eq!(scale.color_for(0.0).to_string(), "#ffb600");
        assert_eq!(scale.color_for(1.0).to_string(), "#eb8230");
        assert_eq!(scale.color_for(0.5).to_string(), "#eb8c00");
    }

    #[test]
    fn test_degenerate_domain_uses_last_stop() {
        let scale = black_white(5.0, 5.0);
        assert_eq!(scale.color_for(5.0), WHITE);
        assert_eq!(scale.color_for(0.0), WHITE);
        assert!(scale.legend_steps(LEGEND_STEPS).iter().all(|&c| c == WHITE));
    }

    #[test]
    fn test_single_stop_scale() {
        let scale = ColorScale::new(vec![BLACK], Domain { min: 0.0, max: 10.0 }, false).unwrap();
        assert_eq!(scale.color_for(7.0), BLACK);
    }

    #[test]
    fn test_empty_scale_rejected() {
        let err = ColorScale::new(Vec::new(), Domain { min: 0.0, max: 1.0 }, false).unwrap_err();
        assert_eq!(err, ColorError::EmptyScale);
    }

    #[test]
    fn test_legend_steps_span_domain() {
        let scale = black_white(10.0, 30.0);
        let values = scale.sample_values(LEGEND_STEPS);
        assert_eq!(values.len(), LEGEND_STEPS);
        assert_eq!(values[0], 10.0);
        assert_eq!(values[LEGEND_STEPS - 1], 30.0);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));

        let steps = scale.legend_steps(LEGEND_STEPS);
        assert_eq!(steps.len(), LEGEND_STEPS);
        assert_eq!(steps[0], BLACK);
        assert_eq!(steps[LEGEND_STEPS - 1], WHITE);
        assert!(steps.windows(2).all(|w| w[0].r <= w[1].r));
    }
}
