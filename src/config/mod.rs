//! Configuration support
//!
//! Loads per-run configuration from an `ecbscan.toml` file in the working
//! directory, merged with CLI flags by the caller. Also owns the batch-mode
//! project predicate (allow/deny lists plus the persisted processed set)
//! that replaces any interactive per-project prompting.
//!
//! ```toml
//! # ecbscan.toml
//!
//! [pipeline]
//! workers = 8
//! verify = true
//!
//! [sandbox]
//! python = "python3"
//! wall_secs = 10
//! cpu_secs = 5
//!
//! [scanner]
//! enabled = true
//! command = ["bandit", "-r", "-f", "json"]
//! timeout_secs = 120
//!
//! [projects]
//! allow = []
//! deny = ["vendor/*"]
//! ```

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the config file looked up in the working directory
pub const CONFIG_FILE: &str = "ecbscan.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub scanner: ScannerSection,
    #[serde(default)]
    pub projects: ProjectsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub workers: usize,
    pub verify: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: 0,
            verify: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSection {
    pub python: String,
    pub wall_secs: u64,
    pub cpu_secs: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            wall_secs: 10,
            cpu_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerSection {
    pub enabled: bool,
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            command: Vec::new(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectsSection {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl ProjectConfig {
    /// Load config from `dir/ecbscan.toml`. A missing file is the default
    /// configuration; a malformed one is reported and ignored.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            debug!("no {} found, using defaults", CONFIG_FILE);
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "malformed {}, using defaults", CONFIG_FILE);
                Self::default()
            }
        }
    }
}

/// Batch-mode project predicate.
///
/// Replaces interactive per-project prompting: a project is processed when
/// it is not in the persisted processed set, not denied, and (if an allow
/// list is present) explicitly allowed. Patterns support a trailing `*`.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    allow: Vec<String>,
    deny: Vec<String>,
    processed: BTreeSet<String>,
}

impl ProjectFilter {
    pub fn new(allow: Vec<String>, deny: Vec<String>, processed: BTreeSet<String>) -> Self {
        Self {
            allow,
            deny,
            processed,
        }
    }

    pub fn should_process(&self, project: &str) -> bool {
        if self.processed.contains(project) {
            return false;
        }
        if self.deny.iter().any(|p| pattern_matches(p, project)) {
            return false;
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|p| pattern_matches(p, project)) {
            return false;
        }
        true
    }

    pub fn mark_processed(&mut self, project: impl Into<String>) {
        self.processed.insert(project.into());
    }
}

fn pattern_matches(pattern: &str, project: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => project.starts_with(prefix),
        None => pattern == project,
    }
}

/// Load the persisted set of already-processed project identifiers.
/// A missing or unreadable file is an empty set.
pub fn load_processed(path: &Path) -> BTreeSet<String> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return BTreeSet::new();
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(projects) => projects.into_iter().collect(),
        Err(e) => {
            warn!(error = %e, "malformed processed-state file, starting empty");
            BTreeSet::new()
        }
    }
}

/// Persist the processed set back to disk
pub fn save_processed(path: &Path, processed: &BTreeSet<String>) -> anyhow::Result<()> {
    let projects: Vec<&String> = processed.iter().collect();
    std::fs::write(path, serde_json::to_string_pretty(&projects)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        assert_eq!(config.pipeline.workers, 0);
        assert!(config.pipeline.verify);
        assert_eq!(config.sandbox.python, "python3");
        assert!(config.scanner.enabled);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[pipeline]\nworkers = 4\nverify = false\n\n\
             [scanner]\ncommand = [\"bandit\", \"-r\", \"-f\", \"json\"]\n\n\
             [projects]\ndeny = [\"vendor/*\"]\n",
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path());
        assert_eq!(config.pipeline.workers, 4);
        assert!(!config.pipeline.verify);
        assert_eq!(config.scanner.command[0], "bandit");
        assert_eq!(config.projects.deny, vec!["vendor/*".to_string()]);
    }

    #[test]
    fn test_malformed_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[pipeline\nbroken").unwrap();
        let config = ProjectConfig::load(dir.path());
        assert_eq!(config.pipeline.workers, 0);
    }

    #[test]
    fn test_filter_precedence() {
        let mut filter = ProjectFilter::new(
            vec!["acme/*".to_string()],
            vec!["acme/legacy".to_string()],
            BTreeSet::new(),
        );
        assert!(filter.should_process("acme/widgets"));
        assert!(!filter.should_process("acme/legacy"), "deny beats allow");
        assert!(!filter.should_process("other/app"), "not on allow list");

        filter.mark_processed("acme/widgets");
        assert!(!filter.should_process("acme/widgets"), "processed set wins");
    }

    #[test]
    fn test_processed_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut processed = BTreeSet::new();
        processed.insert("acme/widgets".to_string());
        processed.insert("beta/app".to_string());
        save_processed(&path, &processed).unwrap();

        let loaded = load_processed(&path);
        assert_eq!(loaded, processed);
        assert!(load_processed(&dir.path().join("missing.json")).is_empty());
    }
}
