use crate::config::AppConfig;
use crate::crossfilter::{Crossfilter, CrossfilterEvent};
use crate::legend::Legend;
use crate::tooltip::{self, Placement};
use crate::view::{Camera, Frame, Viewport};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub struct AppState {
    pub frame: Frame,
    pub crossfilter: Mutex<Crossfilter>,
    pub config: AppConfig,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
    /// Pointer position and window width, when the caller wants tooltip placement.
    x: Option<f64>,
    y: Option<f64>,
    tooltip_width: Option<f64>,
    window_width: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct QueryResponse {
    name: String,
    value: f64,
    fill_color: String,
    tooltip_html: String,
    placement: Option<Placement>,
}

#[derive(Serialize, Debug)]
pub struct CrossfilterResponse {
    event: CrossfilterEvent,
    selected: bool,
    active: Vec<CrossfilterEvent>,
}

#[derive(Serialize)]
pub struct ViewportResponse {
    viewport: Viewport,
    camera: Option<Camera>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let output = &state.config.output;
    Router::new()
        .route("/api/query", get(query_handler))
        .route("/api/crossfilter", post(crossfilter_handler))
        .route("/api/legend", get(legend_handler))
        .route("/api/viewport", get(viewport_handler))
        .nest_service("/tiles", ServeDir::new(output.tile_dir()))
        .fallback_service(ServeDir::new(&output.dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, frame: Frame) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState {
        frame,
        crossfilter: Mutex::new(Crossfilter::default()),
        config,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Tooltip for the region under the pointer. Regions without data have none.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let response = state
        .frame
        .region_at(params.lon, params.lat)
        .and_then(|region| {
            let tooltip = region.tooltip.as_ref()?;
            let placement = match (params.x, params.y, params.tooltip_width, params.window_width) {
                (Some(x), Some(y), Some(width), Some(window)) => {
                    Some(tooltip::place(x, y, width, window))
                }
                _ => None,
            };
            Some(QueryResponse {
                name: region.name.clone(),
                value: region.value?,
                fill_color: region.style.fill_color.to_string(),
                tooltip_html: tooltip.to_html(),
                placement,
            })
        });
    Json(response)
}

async fn crossfilter_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<CrossfilterResponse>> {
    let Some(event) = state.frame.click(params.lon, params.lat) else {
        return Json(None);
    };
    let mut crossfilter = state
        .crossfilter
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let selected = crossfilter.toggle(event.clone());
    info!(field = %event.field, value = %event.value, selected, "Crossfilter toggled");
    Json(Some(CrossfilterResponse {
        event,
        selected,
        active: crossfilter.selected().cloned().collect(),
    }))
}

async fn legend_handler(State(state): State<Arc<AppState>>) -> Json<Option<Legend>> {
    Json(state.frame.legend.clone())
}

async fn viewport_handler(State(state): State<Arc<AppState>>) -> Json<ViewportResponse> {
    let output = &state.config.output;
    Json(ViewportResponse {
        viewport: state.frame.viewport,
        camera: state
            .frame
            .camera(output.viewport_width, output.viewport_height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Observation, RegionFeature};
    use crate::view::MapView;
    use geo::{polygon, MultiPolygon};

    const CONFIG: &str = r#"
        [input]
        regions = "countries.geojson"
        data_csv = "data.csv"
        [input.dimension]
        name = "users.country"
        [input.measure]
        name = "orders.count"
        label_short = "Orders"
        [visualization]
        crossfilter_enabled = true
        show_gridlines_on_blank_regions = true
        [output]
        dir = "out"
        tiles = false
    "#;

    fn state() -> Arc<AppState> {
        let config = AppConfig::from_toml(CONFIG).unwrap();
        let square = |name: &str, x: f64| RegionFeature {
            name: name.to_string(),
            alias: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: x, y: 0.0),
                (x: x + 10.0, y: 0.0),
                (x: x + 10.0, y: 10.0),
                (x: x, y: 10.0),
                (x: x, y: 0.0),
            ]]),
        };
        let mut view = MapView::new(
            vec![square("France", 0.0), square("Chad", 10.0)],
            config.input.dimension.clone(),
        );
        view.refresh(
            &[Observation::new("France", 1500.0)],
            &config.visualization,
            &config.input.measure,
            |_| {},
        )
        .unwrap();
        Arc::new(AppState {
            frame: view.into_frame().unwrap(),
            crossfilter: Mutex::new(Crossfilter::default()),
            config,
        })
    }

    fn at(lon: f64, lat: f64) -> QueryParams {
        QueryParams {
            lat,
            lon,
            x: None,
            y: None,
            tooltip_width: None,
            window_width: None,
        }
    }

    #[tokio::test]
    async fn test_query_returns_tooltip() {
        let state = state();
        let Json(response) = query_handler(State(state.clone()), Query(at(5.0, 5.0))).await;
        let response = response.unwrap();
        assert_eq!(response.name, "France");
        assert_eq!(response.value, 1500.0);
        assert!(response.tooltip_html.contains("1,500"));
        assert!(response.tooltip_html.contains("Orders"));
        assert!(response.placement.is_none());

        // Chad is outlined but has no data.
        let Json(response) = query_handler(State(state), Query(at(15.0, 5.0))).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_query_with_placement() {
        let params = QueryParams {
            x: Some(990.0),
            y: Some(40.0),
            tooltip_width: Some(100.0),
            window_width: Some(1000.0),
            ..at(5.0, 5.0)
        };
        let Json(response) = query_handler(State(state()), Query(params)).await;
        let placement = response.unwrap().placement.unwrap();
        assert!(placement.flipped);
        assert_eq!(placement.left, 870.0);
    }

    #[tokio::test]
    async fn test_crossfilter_toggles() {
        let state = state();
        let Json(first) = crossfilter_handler(State(state.clone()), Query(at(5.0, 5.0))).await;
        let first = first.unwrap();
        assert_eq!(first.event.field, "users.country");
        assert_eq!(first.event.value, "France");
        assert!(first.selected);
        assert_eq!(first.active.len(), 1);

        let Json(second) = crossfilter_handler(State(state.clone()), Query(at(5.0, 5.0))).await;
        let second = second.unwrap();
        assert!(!second.selected);
        assert!(second.active.is_empty());

        let Json(none) = crossfilter_handler(State(state), Query(at(15.0, 5.0))).await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_legend_and_viewport() {
        let state = state();
        let Json(legend) = legend_handler(State(state.clone())).await;
        assert_eq!(legend.unwrap().label, "Orders");

        let Json(viewport) = viewport_handler(State(state)).await;
        assert_eq!(viewport.viewport.max_zoom, 4.0);
        assert_eq!(viewport.camera.unwrap().zoom, 4.0);
    }
}
