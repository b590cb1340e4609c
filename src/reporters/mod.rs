//! Output reporters for run reports
//!
//! Supports multiple output formats:
//! - `text` - Terminal output with colors
//! - `json` - Machine-readable JSON, the stable schema regression tests use
//! - `markdown` - GitHub-flavored Markdown

mod json;
mod markdown;
mod text;

use crate::models::RunReport;
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(anyhow!(
                "Unknown format '{}'. Valid formats: text, json, markdown",
                s
            )),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Render a run report in the specified format
pub fn report(report: &RunReport, format: &str) -> Result<String> {
    let fmt = OutputFormat::from_str(format)?;
    report_with_format(report, fmt)
}

/// Render a run report using an OutputFormat enum
pub fn report_with_format(report: &RunReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => text::render(report),
        OutputFormat::Json => json::render(report),
        OutputFormat::Markdown => markdown::render(report),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::*;

    /// Create a minimal RunReport for renderer tests
    pub(crate) fn test_report() -> RunReport {
        let site = CipherCallSite {
            fragment: FragmentId {
                project: "acme/widgets".into(),
                file: "src/crypto.py".into(),
                line_start: 1,
                line_end: 40,
            },
            line: 12,
            algorithm: CipherAlgorithm::Aes,
            mode_expr: "AES.MODE_ECB".into(),
            mode: Some(CipherMode::Ecb),
            resolution: ResolutionPath::Literal,
            key_expr: Some("KEY".into()),
            key_bits: Some(128),
            key_is_random_per_call: false,
            iv_expr: None,
            enclosing_function: None,
            encrypt_calls: 2,
        };
        let classification = Classification::new(
            site,
            Label::UnsafeEcb,
            vec!["ECB-MODE".into()],
            Confidence::High,
        );
        let attempt = ExploitAttempt::new(
            &classification,
            AttackStrategy::BlockRepetition,
            Outcome::ConfirmedExploitable,
            Evidence {
                repeated_blocks: vec![RepeatedBlockPair { left: 0, right: 1 }],
                timed_out: false,
                notes: Vec::new(),
            },
        );
        let attempts = vec![attempt];
        let classifications = vec![classification];
        let mut summary = ProjectSummary::tally(&classifications, &attempts);
        summary.fragments = 1;

        RunReport {
            run_id: "test-run".into(),
            generated_at: chrono::Utc::now(),
            projects: vec![ProjectReport {
                project: "acme/widgets".into(),
                summary,
                classifications,
                attempts,
                external: ExternalSection {
                    available: false,
                    findings: Vec::new(),
                },
            }],
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("md").unwrap(), OutputFormat::Markdown);
        assert!(OutputFormat::from_str("invalid").is_err());
    }
}
