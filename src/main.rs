use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use compound_diversity::data::load::{FormulaSource, NoFormulas};
use compound_diversity::data::loader::{load_table, FileFormulaSource};
use compound_diversity::{Pipeline, PipelineConfig};

/// Filter a compound abundance table and report per-group diversity and
/// group overlap as JSON.
#[derive(Debug, Parser)]
#[command(name = "compound-diversity", version, about)]
struct Cli {
    /// Compound table (.parquet, .json or .csv)
    input: PathBuf,

    /// CSV with `name,formula` columns; a missing file is tolerated
    #[arg(long)]
    formulas: Option<PathBuf>,

    /// JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the blank-filter sample/blank ratio
    #[arg(long)]
    ratio_threshold: Option<f64>,

    /// Override the cumulative-filter coverage percentage
    #[arg(long)]
    cumulative_percent: Option<f64>,

    /// Write the JSON summary here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let table = load_table(&cli.input)
        .with_context(|| format!("loading {}", cli.input.display()))?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(ratio) = cli.ratio_threshold {
        config.ratio_threshold = ratio;
    }
    if let Some(percent) = cli.cumulative_percent {
        config.cumulative_percent = percent;
    }
    let config = config.infer_columns(&table);
    info!(
        "{} rows; samples {:?}, blanks {:?}",
        table.len(),
        config.sample_columns,
        config.blank_columns
    );

    let formulas: Box<dyn FormulaSource> = match &cli.formulas {
        Some(path) => Box::new(FileFormulaSource::new(path)),
        None => Box::new(NoFormulas),
    };

    let state = Pipeline::new(&table, formulas.as_ref()).run(config)?;

    let json = serde_json::to_string_pretty(&state.summary()).context("serializing summary")?;
    match &cli.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
