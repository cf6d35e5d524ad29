use crate::color::Rgb;
use serde::Serialize;

/// Horizontal and vertical offset of the tooltip from the pointer, in pixels.
const POINTER_OFFSET: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    /// `None` when region names are hidden.
    pub region_name: Option<String>,
    /// Set when the region name is tinted with the heatmap color.
    pub region_color: Option<Rgb>,
    pub measure_label: String,
    pub value_text: String,
}

impl Tooltip {
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        if let Some(name) = &self.region_name {
            let color = self
                .region_color
                .map(|c| c.to_string())
                .unwrap_or_default();
            html.push_str(&format!(
                r#"<p class="tooltip-region" style="color: {}">{}</p>"#,
                color,
                html_escape(name)
            ));
        }
        html.push_str(&format!(
            r#"<p class="tooltip-value-label">{}</p><p class="tooltip-value">{}</p>"#,
            html_escape(&self.measure_label),
            html_escape(&self.value_text)
        ));
        html
    }
}

/// Where to draw a tooltip of `width` pixels for a pointer at (`x`, `y`) page
/// coordinates inside a window `window_width` wide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub left: f64,
    pub top: f64,
    /// Tooltip sits to the left of the pointer.
    pub flipped: bool,
}

pub fn place(x: f64, y: f64, width: f64, window_width: f64) -> Placement {
    let flipped = x + width + POINTER_OFFSET > window_width;
    let left = if flipped {
        x - width - POINTER_OFFSET
    } else {
        x + POINTER_OFFSET
    };
    Placement {
        left,
        top: y - POINTER_OFFSET,
        flipped,
    }
}

/// Format like an en-US locale string: grouped thousands, at most three
/// fraction digits, no trailing zeros.
pub fn format_value(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && (int_part != "0" || !frac_part.is_empty());
    let sign = if negative { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
