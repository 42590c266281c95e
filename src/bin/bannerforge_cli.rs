//! BannerForge CLI
//!
//! Commands: formats, layout, export
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 success, 2 when any format is invalid, 1 on job failure

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use bannerforge_core::{
    EngineConfig, EngineResult, ExportJob, ExportPipeline, FailurePolicy, FormatCatalog,
};

#[derive(Parser)]
#[command(name = "bannerforge-cli")]
#[command(about = "BannerForge CLI - adaptive banner layout and export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Format catalog JSON (built-in catalog when omitted)
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Engine configuration JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog formats
    Formats {
        /// Only formats of this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Print the layout geometry for one format
    Layout {
        /// Format ID
        #[arg(short, long)]
        format: String,

        /// Export job JSON (brand, overlay, overrides)
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Render, validate and package a job
    Export {
        /// Export job JSON
        #[arg(short, long)]
        job: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Worker threads (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Package rendered-but-invalid formats with their errors
        #[arg(long)]
        include_invalid: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(path: Option<&Path>) -> EngineResult<FormatCatalog> {
    match path {
        Some(path) => FormatCatalog::load_from_file(path),
        None => FormatCatalog::builtin(),
    }
}

fn load_config(path: Option<&Path>) -> EngineResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => println!(r#"{{"success": false, "error": "{}"}}"#, e),
    }
}

fn fail(error: impl std::fmt::Display) -> ExitCode {
    print_json(&json!({ "success": false, "error": error.to_string() }));
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let catalog = match load_catalog(cli.catalog.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(format!("Failed to load catalog: {}", e)),
    };
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(format!("Failed to load config: {}", e)),
    };

    match cli.command {
        Commands::Formats { platform } => {
            let formats: Vec<_> = catalog
                .formats()
                .filter(|f| platform.as_deref().map_or(true, |p| f.platform_id == p))
                .map(|f| {
                    json!({
                        "id": f.id,
                        "name": f.name,
                        "platform": f.platform_id,
                        "category": f.category_id,
                        "width": f.width,
                        "height": f.height,
                        "maxSizeKB": f.max_size_kb,
                        "fileTypes": f.allowed_file_types,
                        "safeZone": f.safe_zone.is_some(),
                        "isVideo": f.is_video,
                    })
                })
                .collect();
            print_json(&json!({ "catalogVersion": catalog.version(), "formats": formats }));
            ExitCode::SUCCESS
        }

        Commands::Layout { format, job } => {
            let job = match ExportJob::load_from_file(&job) {
                Ok(j) => j,
                Err(e) => return fail(format!("Invalid job: {}", e)),
            };
            let pipeline = match ExportPipeline::new(catalog, config) {
                Ok(p) => p,
                Err(e) => return fail(e),
            };
            match pipeline.layout_for(&format, &job) {
                Ok(geometry) => {
                    print_json(&json!({ "success": true, "formatId": format, "geometry": geometry }));
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Export { job, out, workers, include_invalid } => {
            if let Some(n) = workers {
                config.workers = n;
            }
            if include_invalid {
                config.failure_policy = FailurePolicy::IncludeWithDiagnostics;
            }
            let job = match ExportJob::load_from_file(&job) {
                Ok(j) => j,
                Err(e) => return fail(format!("Invalid job: {}", e)),
            };
            let pipeline = match ExportPipeline::new(catalog, config) {
                Ok(p) => p,
                Err(e) => return fail(e),
            };

            let progress = |current: usize, total: usize, id: &str| {
                tracing::info!(current, total, format = id, "format done");
            };
            let report = match pipeline.run(&job, Some(&progress)) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };
            if let Err(e) = report.deliverable.write_to_dir(&out) {
                return fail(format!("Failed to write deliverable: {}", e));
            }

            print_json(&json!({
                "success": true,
                "output": out.display().to_string(),
                "manifest": report.deliverable.manifest,
                "results": report.results,
            }));
            if report.all_valid() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
    }
}
