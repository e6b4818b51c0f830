use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use occupy::{
    AnalysisConfig, AnalysisError, AnalysisOutcome, AnalysisReport, OccupancyEstimator,
    SolventAnalysis,
};

#[cfg(not(feature = "tracing"))]
use log::info;
#[cfg(feature = "tracing")]
use tracing::info;

#[cfg(feature = "tracing")]
use occupy_core::init_tracing;
#[cfg(not(feature = "tracing"))]
use occupy_core::init_with_level;
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

/// Estimate solvent limits and the occupancy threshold of a density map.
#[derive(Debug, Parser)]
#[command(name = "occupy", version, about)]
struct Cli {
    /// JSON analysis config.
    #[arg(long)]
    config: PathBuf,

    /// Report path; overrides `output_path` from the config.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Include histogram, fit and fraction curves in the report.
    #[arg(long)]
    diagnostics: bool,

    /// off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,

    /// Emit JSON log lines.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    json_logs: bool,
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse()
        .map_err(|_| format!("unknown log level '{s}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(not(feature = "tracing"))]
    if let Err(err) = init_with_level(cli.log_level) {
        eprintln!("failed to install logger: {err}");
    }

    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        init_tracing(&cli.log_level.to_string().to_lowercase(), cli.json_logs);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all))]
fn run(cli: &Cli) -> Result<(), AnalysisError> {
    let cfg = AnalysisConfig::load_json(&cli.config)?;
    let output_path = cli.output.clone().unwrap_or_else(|| cfg.output_path());
    let mut report = AnalysisReport::new(&cfg, &cli.config);

    let result = analyse(&cfg, cli.diagnostics);
    match &result {
        Ok(outcome) => report.set_outcome(outcome.clone()),
        Err(err) => report.set_error(err),
    }
    report.write_json(&output_path)?;
    info!("wrote analysis report to {}", output_path.display());

    let outcome = result?;
    let r = outcome.solvent.range;
    println!(
        "solvent limits: {:.4} : {:.4} : {:.4} : {:.4}",
        r.low, r.mid_low, r.mid_high, r.high
    );
    if let Some(occ) = outcome.occupancy {
        println!("occupancy threshold: {:.3}", occ.threshold);
    }
    Ok(())
}

fn analyse(cfg: &AnalysisConfig, diagnostics: bool) -> Result<AnalysisOutcome, AnalysisError> {
    let volume = cfg.load_volume()?;
    let mask = cfg.build_mask()?;
    let occupancy = cfg.build_occupancy()?;
    let estimator = occupancy.as_ref().map(|o| o as &dyn OccupancyEstimator);

    let analysis = SolventAnalysis::new(cfg.analysis.clone());
    if diagnostics {
        analysis.run_with_diagnostics(volume.view(), &mask, estimator)
    } else {
        analysis.run(volume.view(), &mask, estimator)
    }
}
