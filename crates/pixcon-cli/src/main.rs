//! pixcon - visual similarity consensus CLI
//!
//! ## Commands
//!
//! - `compare`: Compare two images with every available backend
//! - `tools`: Show which comparison tools this host provides
//! - `show`: Summarize a persisted comparison report

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

use pixcon_core::metrics::METRICS;
use pixcon_core::telemetry::{init_tracing, LogFormat};
use pixcon_core::{
    render_summary_md, BackendKind, CompareOptions, ComparisonEngine, ComparisonReport,
    ComparisonTarget, EngineConfig, ReportAssembler,
};

#[derive(Parser)]
#[command(name = "pixcon")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-backend visual similarity consensus", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "PIXCON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a reference image against a candidate
    Compare {
        /// Reference image (the design)
        reference: PathBuf,

        /// Candidate image (the implementation)
        candidate: PathBuf,

        /// Directory for reports and diff artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Skip a backend, by backend or tool name (repeatable)
        #[arg(long = "skip", value_name = "NAME")]
        skip: Vec<BackendKind>,

        /// Per-backend time budget in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List comparison tools and their versions
    Tools,

    /// Print the summary of a persisted report
    Show {
        /// Report file written by `compare`
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(format, level);

    let result = match cli.command {
        Commands::Compare {
            reference,
            candidate,
            output_dir,
            skip,
            timeout_secs,
            json,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            cmd_compare(config, reference, candidate, skip, timeout_secs, json).await
        }
        Commands::Tools => cmd_tools(load_config(cli.config.as_deref())?).await,
        Commands::Show { report } => cmd_show(&report),
    };

    METRICS.flush();
    result
}

/// Defaults, then the config file, then `PIXCON_*` variables.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let base = match path {
        Some(path) => EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    base.with_env_overrides()
        .context("Invalid PIXCON_* environment override")
}

async fn cmd_compare(
    config: EngineConfig,
    reference: PathBuf,
    candidate: PathBuf,
    skip: Vec<BackendKind>,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut options = CompareOptions::default();
    for kind in skip {
        options = options.skip(kind);
    }
    if let Some(secs) = timeout_secs {
        anyhow::ensure!(secs > 0, "--timeout-secs must be at least 1");
        for kind in BackendKind::ALL {
            options = options.with_timeout(kind, Duration::from_secs(secs));
        }
    }

    let engine = ComparisonEngine::new(config)
        .await
        .context("Failed to start comparison engine")?;
    let outcome = engine
        .compare(ComparisonTarget::new(reference, candidate), &options)
        .await
        .context("Comparison failed")?;
    info!(path = %outcome.path.display(), "report written");

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        let v = &outcome.report.verdict;
        println!("Score:       {:.1}%", v.aggregate_score);
        println!(
            "Readiness:   {} ({})",
            v.readiness_tier,
            v.readiness_tier.description()
        );
        println!(
            "Consensus:   {} ({:.0}% positive)",
            v.consensus,
            v.consensus_ratio * 100.0
        );
        println!("{}", confidence_line(&outcome.report));
        println!();
        for issue in &v.critical_issues {
            println!("  ! {}", issue);
        }
        for rec in &v.recommendations {
            println!("  - {}", rec);
        }
        println!();
    }
    println!("Report: {}", outcome.path.display());
    Ok(())
}

/// Unavailable backends were never run and stay out of the denominator.
fn confidence_line(report: &ComparisonReport) -> String {
    format!(
        "Confidence:  {:.0}% ({}/{} backends)",
        report.verdict.confidence * 100.0,
        report.verdict.backends_used.len(),
        report.attempted_count()
    )
}

async fn cmd_tools(config: EngineConfig) -> Result<()> {
    let engine = ComparisonEngine::new(config)
        .await
        .context("Failed to probe comparison tools")?;
    let registry = engine.registry();

    println!("{:<22} {:<15} {}", "BACKEND", "TOOL", "STATUS");
    for cap in registry.capabilities().values() {
        let status = if cap.available {
            let invocation = cap
                .invocation
                .as_ref()
                .map(|i| i.to_string())
                .unwrap_or_default();
            match &cap.version {
                Some(version) => format!("{} ({})", invocation, version),
                None => invocation,
            }
        } else {
            "missing".to_string()
        };
        println!("{:<22} {:<15} {}", cap.kind, cap.kind.tool_name(), status);
    }

    let missing: Vec<_> = registry.missing().collect();
    if !missing.is_empty() {
        println!();
        println!("Missing tools:");
        for cap in missing {
            println!(
                "  {}: {}",
                cap.kind.tool_name(),
                cap.reason.as_deref().unwrap_or("not installed")
            );
        }
    }
    Ok(())
}

fn cmd_show(path: &Path) -> Result<()> {
    let report = ReportAssembler::load(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    print!("{}", render_summary_md(&report));
    Ok(())
}
