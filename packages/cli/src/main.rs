#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the CO₂ emissions grid engine.
//!
//! Builds the baseline, runs interventions, and prints per-borough totals
//! without going through HTTP. `serve` starts the API server.

mod export;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use co2_map_grid::EngineConfig;
use co2_map_sensor::StaticSource;
use co2_map_server::AppState;
use co2_map_server_models::ApiMetadata;

#[derive(Parser)]
#[command(name = "co2_map_cli", about = "NYC CO₂ emissions grid engine")]
struct Cli {
    /// Skip the sensor fetch and use the synthetic model only
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the calibrated baseline and print its statistics
    Baseline {
        /// Write the grid as a `GeoJSON` `FeatureCollection` of points
        #[arg(long)]
        geojson: Option<PathBuf>,
    },
    /// Apply an intervention directive and print before/after statistics
    Simulate {
        /// Directive as JSON, e.g. '{"target":"Manhattan","magnitude":50,"direction":"decrease"}'
        #[arg(long)]
        directive: String,
    },
    /// Print the baseline broken down by borough
    Regions,
    /// Start the API server
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Baseline { geojson } => {
            let response = build_state(cli.offline)?.baseline_response(false).await?;
            print_metadata(&response.metadata);
            if let Some(path) = geojson {
                let collection = export::to_feature_collection(&response.grid);
                std::fs::write(&path, collection.to_string())?;
                log::info!("Wrote {} cells to {}", response.grid.len(), path.display());
            }
        }
        Commands::Simulate { directive } => {
            let raw: serde_json::Value = serde_json::from_str(&directive)?;
            let response = build_state(cli.offline)?.simulate(&raw).await?;
            let stats = &response.statistics;
            if stats.is_unrelated {
                println!("Request is unrelated to emissions; grid unchanged.");
            }
            println!("Baseline:        {:>14.0} t/yr", stats.baseline_tons_co2);
            println!("Modified:        {:>14.0} t/yr", stats.reduced_tons_co2);
            println!("Annual savings:  {:>14.0} t/yr", stats.annual_savings_tons_co2);
            println!("Realized change: {:>13.2}% ({})", stats.percentage_reduction, stats.direction);
            if let Some(nominal) = stats.nominal_percent {
                println!("Requested:       {nominal:>13.2}%");
            }
            println!("Cells affected:  {:>14}", stats.cells_affected);
        }
        Commands::Regions => {
            println!("{:<16} {:>6} {:>10} {:>12} {:>14}", "Region", "Cells", "km²", "Avg", "t/yr");
            for region in build_state(cli.offline)?.regions_response().await? {
                println!(
                    "{:<16} {:>6} {:>10.1} {:>12.2} {:>14.0}",
                    region.name,
                    region.datapoints,
                    region.coverage_area_km2,
                    region.average_emission_intensity,
                    region.annual_emissions_tonnes
                );
            }
        }
        Commands::Serve => {
            // The server uses actix-web's runtime, so we need to run it
            // in a blocking task to avoid nesting tokio runtimes.
            tokio::task::spawn_blocking(|| {
                actix_web::rt::System::new().block_on(co2_map_server::run_server())
            })
            .await??;
        }
    }

    Ok(())
}

fn build_state(offline: bool) -> Result<AppState, co2_map_server::ServerError> {
    if offline {
        AppState::new(
            EngineConfig::from_env()?,
            Arc::new(StaticSource::new(Vec::new())),
            Duration::from_secs(1),
        )
    } else {
        AppState::from_env()
    }
}

fn print_metadata(metadata: &ApiMetadata) {
    println!("{} ({})", metadata.city, metadata.unit);
    println!("  Source:       {} ({} sensors)", metadata.baseline_source, metadata.sensor_count);
    println!("  Datapoints:   {}", metadata.datapoints);
    println!("  Cell area:    {:.4} km²", metadata.cell_area_km2);
    println!("  Coverage:     {:.1} km²", metadata.coverage_area_km2);
    println!("  Average:      {:.2}", metadata.average_emission_intensity);
    println!("  Daily total:  {:.0} t", metadata.total_emissions_per_day);
    println!("  Annual total: {:.0} t", metadata.annual_emissions_tonnes);
}
