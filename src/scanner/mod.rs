//! External scanner bridge
//!
//! Invokes an optional Bandit-compatible static scanner over a project path
//! and merges its findings into the report. The scanner's absence is a
//! normal configuration state; its failure degrades the external section to
//! empty and never fails the core pipeline.

use crate::errors::EngineError;
use crate::exec::{is_tool_installed, run_bounded, ExecOptions};
use crate::models::{ExternalFinding, ExternalSection, Severity};
use serde_json::Value as JsonValue;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default invocation, Bandit's JSON report mode
fn default_command() -> Vec<String> {
    vec![
        "bandit".to_string(),
        "-r".to_string(),
        "-f".to_string(),
        "json".to_string(),
    ]
}

/// Bridge to an external Bandit-compatible scanner
pub struct ScannerBridge {
    command: Vec<String>,
    timeout_secs: u64,
}

impl Default for ScannerBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerBridge {
    pub fn new() -> Self {
        Self {
            command: default_command(),
            timeout_secs: 120,
        }
    }

    /// Replace the scanner invocation (the target path is appended)
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.command = command;
        }
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Whether the configured scanner binary exists
    pub fn available(&self) -> bool {
        self.command
            .first()
            .map(|tool| is_tool_installed(tool))
            .unwrap_or(false)
    }

    /// Scan a project path, degrading on any failure.
    ///
    /// This is the only entry point the pipeline uses: it never returns an
    /// error, only a section that is empty when the tool is missing or
    /// misbehaves.
    pub fn scan(&self, path: &Path) -> ExternalSection {
        if !self.available() {
            debug!("external scanner not installed, skipping");
            return ExternalSection {
                available: false,
                findings: Vec::new(),
            };
        }

        match self.run(path) {
            Ok(findings) => {
                info!(count = findings.len(), "external scanner findings merged");
                ExternalSection {
                    available: true,
                    findings,
                }
            }
            Err(e) => {
                warn!(error = %e, "external scanner failed, continuing without it");
                ExternalSection {
                    available: true,
                    findings: Vec::new(),
                }
            }
        }
    }

    /// Run the scanner and parse its JSON output
    fn run(&self, path: &Path) -> Result<Vec<ExternalFinding>, EngineError> {
        let mut cmd = self.command.clone();
        cmd.push(path.to_string_lossy().to_string());

        let tool = self.command[0].clone();
        let result = run_bounded(&cmd, &tool, self.timeout_secs, &ExecOptions::default());

        if result.timed_out {
            return Err(EngineError::ExternalToolFailure(format!(
                "{} timed out after {}s",
                tool, self.timeout_secs
            )));
        }
        if let Some(error) = result.error {
            return Err(EngineError::ExternalToolUnavailable(error));
        }

        // Bandit exits non-zero when it has findings; the JSON body is
        // authoritative, not the exit code
        let json = result.json_output().ok_or_else(|| {
            EngineError::ExternalToolFailure(format!("{} produced unparsable output", tool))
        })?;

        Ok(parse_findings(&json))
    }
}

/// Parse Bandit-shaped results: `{"results": [{test_id, filename,
/// line_number, issue_severity}, ...]}`
fn parse_findings(json: &JsonValue) -> Vec<ExternalFinding> {
    let Some(results) = json.get("results").and_then(|r| r.as_array()) else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|entry| {
            let rule_id = entry.get("test_id")?.as_str()?.to_string();
            let file = entry.get("filename")?.as_str()?.into();
            let line = entry.get("line_number")?.as_u64()? as u32;
            let severity = entry
                .get("issue_severity")
                .and_then(|s| s.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(Severity::Medium);
            Some(ExternalFinding {
                rule_id,
                file,
                line,
                severity,
            })
        })
        .collect()
}
