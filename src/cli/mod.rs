//! CLI command definitions and handlers

mod doctor;
mod scan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate workers count (0 = auto, max 64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// ecbscan - ECB misuse detection and exploit verification
#[derive(Parser, Debug)]
#[command(name = "ecbscan")]
#[command(
    version,
    about = "Detect AES-ECB misuse in Python code and verify that it is practically exploitable",
    long_about = "ecbscan classifies every cipher construction it finds in extracted Python \
source as safe, unsafe-ECB, unsafe-other, or indeterminate, then attempts to \
demonstrate that unsafe-ECB sites actually leak: a sandboxed block-repetition \
probe drives the extracted routine with repeated plaintext blocks, and a \
static distinguishability proof covers sites that cannot be executed.",
    after_help = "\
Examples:
  ecbscan scan ./unpacked-repo --project acme/widgets   Scan an unpacked project tree
  ecbscan scan . --format json -o report.json           JSON report for scripting
  ecbscan scan . --no-verify                            Classification only
  ecbscan ingest fragments.jsonl                        Consume an upstream fragment stream
  ecbscan doctor                                        Check interpreter and scanner availability"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (0 = auto)
    #[arg(long, global = true, default_value = "0", value_parser = parse_workers)]
    pub workers: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan an unpacked project tree for cipher misuse
    Scan {
        /// Path to the project tree
        path: PathBuf,

        /// Project identifier used in the report (default: directory name)
        #[arg(long)]
        project: Option<String>,

        /// Output format: text, json, markdown (or md)
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json", "markdown", "md"])]
        format: String,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Skip exploit verification; classify only
        #[arg(long)]
        no_verify: bool,

        /// Skip the external scanner even if installed
        #[arg(long)]
        no_scanner: bool,

        /// Persisted set of already-processed projects
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Exit non-zero when any call site is confirmed exploitable
        #[arg(long)]
        fail_on_confirmed: bool,
    },

    /// Run the pipeline over a JSONL fragment stream from upstream tooling
    Ingest {
        /// Path to the fragment stream (one JSON CodeFragment per line)
        fragments: PathBuf,

        /// Output format: text, json, markdown (or md)
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json", "markdown", "md"])]
        format: String,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Skip exploit verification; classify only
        #[arg(long)]
        no_verify: bool,

        /// Persisted set of already-processed projects
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Exit non-zero when any call site is confirmed exploitable
        #[arg(long)]
        fail_on_confirmed: bool,
    },

    /// Check environment: interpreter, scanner, parser grammar
    Doctor,
}

/// Dispatch a parsed CLI invocation
pub fn run(cli: Cli) -> Result<()> {
    let workers = cli.workers;
    match cli.command {
        Commands::Scan {
            path,
            project,
            format,
            output,
            no_verify,
            no_scanner,
            state_file,
            fail_on_confirmed,
        } => scan::run_scan(scan::ScanArgs {
            path,
            project,
            format,
            output,
            no_verify,
            no_scanner,
            state_file,
            fail_on_confirmed,
            workers,
        }),
        Commands::Ingest {
            fragments,
            format,
            output,
            no_verify,
            state_file,
            fail_on_confirmed,
        } => scan::run_ingest(scan::IngestArgs {
            fragments,
            format,
            output,
            no_verify,
            state_file,
            fail_on_confirmed,
            workers,
        }),
        Commands::Doctor => doctor::run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from([
            "ecbscan", "scan", ".", "--format", "json", "--no-verify", "--workers", "4",
        ])
        .unwrap();
        assert_eq!(cli.workers, 4);
        match cli.command {
            Commands::Scan { no_verify, format, .. } => {
                assert!(no_verify);
                assert_eq!(format, "json");
            }
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_workers() {
        assert!(Cli::try_parse_from(["ecbscan", "scan", ".", "--workers", "100"]).is_err());
    }

    #[test]
    fn test_cli_parses_ingest_and_doctor() {
        assert!(Cli::try_parse_from(["ecbscan", "ingest", "frags.jsonl"]).is_ok());
        assert!(Cli::try_parse_from(["ecbscan", "doctor"]).is_ok());
    }
}
