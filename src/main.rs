pub mod types;
pub mod config;
pub mod color;
pub mod data;
pub mod resolver;
pub mod style;
pub mod tooltip;
pub mod legend;
pub mod crossfilter;
pub mod mercator;
pub mod view;
pub mod render;
pub mod server;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the heatmap layer, legend and tiles
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the rendered map with tooltip and crossfilter endpoints
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

/// Load the geography and the data table, then run one refresh.
fn build_frame(app_config: &config::AppConfig) -> Result<view::Frame> {
    let regions = data::load_regions(&app_config.input)?;
    let observations = data::load_observations(&app_config.input)?;

    let mut map = view::MapView::new(regions, app_config.input.dimension.clone());
    map.refresh(
        &observations,
        &app_config.visualization,
        &app_config.input.measure,
        |frame| {
            info!(
                regions = frame.regions.len(),
                legend = frame.legend.is_some(),
                "Refresh done"
            )
        },
    )?;
    map.into_frame()
        .ok_or_else(|| anyhow!("Refresh produced no frame"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let frame = build_frame(&app_config)?;
            render::write_outputs(&frame, &app_config.output)?;
            info!("Render complete: {:?}", app_config.output.dir);
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let frame = build_frame(&app_config)?;
            server::start_server(app_config, frame).await?;
        }
    }

    Ok(())
}
