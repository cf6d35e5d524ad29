use crate::color::{ColorScale, Domain, Rgb, LEGEND_STEPS};
use crate::tooltip::{format_value, html_escape};
use serde::Serialize;

/// Gradient bar with the measure label above and the domain ends below.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub label: String,
    pub steps: Vec<Rgb>,
    pub domain: Domain,
}

impl Legend {
    pub fn build(scale: &ColorScale, label: &str) -> Self {
        Self {
            label: label.to_string(),
            steps: scale.legend_steps(LEGEND_STEPS),
            domain: scale.domain(),
        }
    }

    pub fn min_label(&self) -> String {
        format_value(self.domain.min)
    }

    pub fn max_label(&self) -> String {
        format_value(self.domain.max)
    }

    pub fn to_html(&self) -> String {
        let gradient: String = self
            .steps
            .iter()
            .map(|c| format!(r#"<span style="background-color: {};"></span>"#, c))
            .collect();
        format!(
            concat!(
                r#"<div class="info legend">"#,
                r#"<div class="label-container"><span class="label">{}</span></div>"#,
                r#"<div class="gradient-container">{}</div>"#,
                r#"<div class="values-container">"#,
                r#"<span class="value min">{}</span><span class="value max">{}</span>"#,
                r#"</div></div>"#
            ),
            html_escape(&self.label),
            gradient,
            self.min_label(),
            self.max_label()
        )
    }
}
