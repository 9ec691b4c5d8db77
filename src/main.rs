use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stock_grid::catalog::Catalog;
use stock_grid::config::AppConfig;
use stock_grid::observability;
use stock_grid::preprocessing::ImageSource;
use stock_grid::recognizer::TesseractEngine;
use stock_grid::stock::StockStore;
use stock_grid::GridOcrPipeline;
use tracing::{debug, info};

/// Read an inventory screenshot and update the stock file from its grid.
///
/// Grid geometry, recognition and storage settings come from the
/// environment (`.env` is honoured); the flags override the grid only.
#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about)]
struct CliArgs {
    /// Screenshot path, or an http(s) URL to fetch it from
    image: String,
    /// Grid rows; the grid stays anchored to its bottom edge
    #[arg(short, long)]
    rows: Option<i32>,
    /// Recognition scale for the first attempt
    #[arg(short, long)]
    scale: Option<f32>,
}

impl CliArgs {
    fn source(&self) -> ImageSource {
        if self.image.starts_with("http://") || self.image.starts_with("https://") {
            ImageSource::Url(self.image.clone())
        } else {
            ImageSource::File(PathBuf::from(&self.image))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(rows) = args.rows {
        config.grid = config.grid.with_rows(rows, config.fixed_bottom);
    }
    if let Some(scale) = args.scale {
        config.grid.scale = scale;
    }

    observability::init_tracing(&config.observability)?;
    let config = config.into_validated()?;
    info!("{}", config.summary());

    let catalog = Catalog::load(config.catalog_path.as_deref())?;
    let stock = Arc::new(StockStore::open(&config.stock_path)?);
    let engine = Arc::new(TesseractEngine::new(config.ocr.clone()));
    let pipeline = GridOcrPipeline::new(config, catalog, Arc::clone(&stock), engine)?;

    let preview = pipeline.on_image_selected(args.source()).await?;
    info!(
        tiles = preview.tiles.len(),
        columns = preview.effective_columns,
        "Grid laid over image"
    );

    let report = pipeline.on_run_requested().await?;
    for line in report.debug_lines(pipeline.catalog()) {
        debug!("{}", line);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    stock.save()?;
    info!(status = report.status.message(), "Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let parsed = CliArgs::try_parse_from(["stock-grid", "shot.png", "--rows", "3", "-s", "2.5"])
            .expect("parse");
        assert_eq!(
            parsed,
            CliArgs {
                image: "shot.png".to_string(),
                rows: Some(3),
                scale: Some(2.5),
            }
        );
        assert!(matches!(parsed.source(), ImageSource::File(_)));

        let url = CliArgs::try_parse_from(["stock-grid", "https://example.com/a.png"])
            .expect("parse");
        assert!(matches!(url.source(), ImageSource::Url(_)));
        assert_eq!((url.rows, url.scale), (None, None));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(CliArgs::try_parse_from(["stock-grid"]).is_err());
        assert!(CliArgs::try_parse_from(["stock-grid", "a.png", "--rows"]).is_err());
        assert!(CliArgs::try_parse_from(["stock-grid", "a.png", "--rows", "many"]).is_err());
        assert!(CliArgs::try_parse_from(["stock-grid", "a.png", "b.png"]).is_err());
        assert!(CliArgs::try_parse_from(["stock-grid", "a.png", "--verbose"]).is_err());
    }
}
