use anyhow::Result;
use clap::{Parser, Subcommand};
use plz_heatmap::{config, pipeline, render, server};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one layer to a standalone HTML map
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_enum, default_value_t = render::Layer::Residents)]
        layer: render::Layer,
        #[arg(short, long, value_name = "FILE", default_value = "map.html")]
        output: PathBuf,
    },
    /// Serve the dashboard with the layer selector
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Run the pipeline and report what each layer contains
    Summary {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, layer, output } => {
            info!("Rendering {} map with config: {:?}", layer, config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let prepared = pipeline::prepare(&app_config)?;
            let choropleth = render::Choropleth::build(&prepared.data, *layer);
            render::write_html(&choropleth, &app_config.map, output)?;

            info!("Render complete!");
        }
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let prepared = pipeline::prepare(&app_config)?;
            server::start_server(app_config, prepared).await?;
        }
        Commands::Summary { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let prepared = pipeline::prepare(&app_config)?;

            for layer in render::Layer::ALL {
                let choropleth = render::Choropleth::build(&prepared.data, layer);
                info!(
                    "{}: {} postal codes, {} from {} to {}",
                    layer,
                    choropleth.areas.len(),
                    choropleth.legend.caption,
                    choropleth.legend.vmin,
                    choropleth.legend.vmax
                );
            }
            let warnings = prepared.diagnostics.warnings().len();
            if warnings > 0 {
                warn!("{} warnings raised while preparing the data", warnings);
            }
        }
    }

    Ok(())
}
