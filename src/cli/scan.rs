//! Scan and ingest command handlers

use crate::classifier::UsageClassifier;
use crate::config::{self, ProjectConfig, ProjectFilter};
use crate::extract;
use crate::models::{CodeFragment, RunReport};
use crate::pipeline::Pipeline;
use crate::reporters;
use crate::scanner::ScannerBridge;
use crate::verifier::sandbox::SandboxConfig;
use crate::verifier::ExploitVerifier;
use anyhow::{bail, Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct ScanArgs {
    pub path: PathBuf,
    pub project: Option<String>,
    pub format: String,
    pub output: Option<PathBuf>,
    pub no_verify: bool,
    pub no_scanner: bool,
    pub state_file: Option<PathBuf>,
    pub fail_on_confirmed: bool,
    pub workers: usize,
}

pub struct IngestArgs {
    pub fragments: PathBuf,
    pub format: String,
    pub output: Option<PathBuf>,
    pub no_verify: bool,
    pub state_file: Option<PathBuf>,
    pub fail_on_confirmed: bool,
    pub workers: usize,
}

pub fn run_scan(args: ScanArgs) -> Result<()> {
    if !args.path.is_dir() {
        bail!("'{}' is not a directory", args.path.display());
    }

    let project = args.project.clone().unwrap_or_else(|| {
        args.path
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "unnamed-project".to_string())
    });

    let config = ProjectConfig::load(Path::new("."));
    let fragments = extract::walk_project(&args.path, &project);
    info!(count = fragments.len(), project = %project, "extracted fragments");

    let scanner = if args.no_scanner || !config.scanner.enabled {
        None
    } else {
        Some(
            ScannerBridge::new()
                .with_command(config.scanner.command.clone())
                .with_timeout(config.scanner.timeout_secs),
        )
    };

    let report = execute(
        &config,
        fragments,
        args.no_verify,
        args.workers,
        args.state_file.as_deref(),
        scanner,
        Some((project.as_str(), args.path.as_path())),
    )?;

    finish(
        &report,
        &args.format,
        args.output.as_deref(),
        args.state_file.as_deref(),
        args.fail_on_confirmed,
    )
}

pub fn run_ingest(args: IngestArgs) -> Result<()> {
    let config = ProjectConfig::load(Path::new("."));
    let fragments = extract::read_jsonl(&args.fragments)?;
    info!(count = fragments.len(), "read fragment stream");

    let report = execute(
        &config,
        fragments,
        args.no_verify,
        args.workers,
        args.state_file.as_deref(),
        None,
        None,
    )?;

    finish(
        &report,
        &args.format,
        args.output.as_deref(),
        args.state_file.as_deref(),
        args.fail_on_confirmed,
    )
}

/// Shared run path for both commands
fn execute(
    config: &ProjectConfig,
    fragments: Vec<CodeFragment>,
    no_verify: bool,
    workers: usize,
    state_file: Option<&Path>,
    scanner: Option<ScannerBridge>,
    scan_root: Option<(&str, &Path)>,
) -> Result<RunReport> {
    let verifier = if no_verify || !config.pipeline.verify {
        ExploitVerifier::disabled()
    } else {
        ExploitVerifier::new(SandboxConfig {
            python: config.sandbox.python.clone(),
            wall_secs: config.sandbox.wall_secs,
            cpu_secs: config.sandbox.cpu_secs,
        })
    };

    let processed = state_file.map(config::load_processed).unwrap_or_default();
    let filter = ProjectFilter::new(
        config.projects.allow.clone(),
        config.projects.deny.clone(),
        processed,
    );

    let progress = ProgressBar::new(fragments.len() as u64).with_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} fragments")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let bar = progress.clone();

    let effective_workers = if workers > 0 {
        workers
    } else {
        config.pipeline.workers
    };

    let mut pipeline = Pipeline::new(UsageClassifier::new(), verifier)
        .with_workers(effective_workers)
        .with_progress(Box::new(move |done, _total| {
            bar.set_position(done as u64);
        }));
    if let Some(scanner) = scanner {
        pipeline = pipeline.with_scanner(scanner);
    }

    let report = pipeline.run(fragments, &filter, scan_root)?;
    progress.finish_and_clear();
    Ok(report)
}

/// Render, write, persist state, and apply the exit policy
fn finish(
    report: &RunReport,
    format: &str,
    output: Option<&Path>,
    state_file: Option<&Path>,
    fail_on_confirmed: bool,
) -> Result<()> {
    let rendered = reporters::report(report, format)?;

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            eprintln!(
                "{} report written to {}",
                style("✓").green(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }

    if let Some(path) = state_file {
        let mut processed = config::load_processed(path);
        for project in &report.projects {
            processed.insert(project.project.clone());
        }
        config::save_processed(path, &processed)?;
    }

    let confirmed = report.confirmed_total();
    if confirmed > 0 {
        eprintln!(
            "{} {} call site(s) confirmed exploitable",
            style("!").red().bold(),
            confirmed
        );
        if fail_on_confirmed {
            std::process::exit(1);
        }
    }
    Ok(())
}
