//! Finding Aggregator
//!
//! Pure collection keyed by project: classifications, exploit attempts, and
//! the optional external-scanner section flow in from parallel per-project
//! pipelines and come out as one stable, serializable `RunReport`. There is
//! no re-computation here, only merging and deduplication by
//! (file path, line range, rule id).

use crate::models::{
    Classification, ExploitAttempt, ExternalSection, ProjectReport, ProjectSummary, RunReport,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Default)]
struct ProjectBucket {
    fragments: usize,
    classifications: Vec<Classification>,
    attempts: Vec<ExploitAttempt>,
    external: ExternalSection,
}

/// Collects results from concurrently running project pipelines
#[derive(Default)]
pub struct FindingAggregator {
    projects: DashMap<String, ProjectBucket>,
}

impl FindingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a fragment toward its project, creating the project entry.
    /// The project report exists from the first fragment classified.
    pub fn note_fragment(&self, project: &str) {
        self.projects.entry(project.to_string()).or_default().fragments += 1;
    }

    pub fn record_classifications(&self, project: &str, classifications: Vec<Classification>) {
        self.projects
            .entry(project.to_string())
            .or_default()
            .classifications
            .extend(classifications);
    }

    pub fn record_attempts(&self, project: &str, attempts: Vec<ExploitAttempt>) {
        self.projects
            .entry(project.to_string())
            .or_default()
            .attempts
            .extend(attempts);
    }

    pub fn attach_external(&self, project: &str, external: ExternalSection) {
        self.projects.entry(project.to_string()).or_default().external = external;
    }

    /// Finalize into the run report. Consumes the aggregator; a run's
    /// in-memory state is discarded once the report is written.
    pub fn finalize(self, run_id: String) -> RunReport {
        let mut projects: Vec<ProjectReport> = self
            .projects
            .into_iter()
            .map(|(project, bucket)| finalize_project(project, bucket))
            .collect();
        projects.sort_by(|a, b| a.project.cmp(&b.project));

        RunReport {
            run_id,
            generated_at: Utc::now(),
            projects,
        }
    }
}

fn finalize_project(project: String, bucket: ProjectBucket) -> ProjectReport {
    let mut classifications = bucket.classifications;
    classifications.sort_by(|a, b| {
        (&a.call_site.fragment.file, a.call_site.line, &a.rules)
            .cmp(&(&b.call_site.fragment.file, b.call_site.line, &b.rules))
    });
    // Dedup by (file path, line range, rule id)
    let mut seen = HashSet::new();
    classifications.retain(|c| {
        seen.insert((
            c.call_site.fragment.file.clone(),
            c.call_site.line,
            c.call_site.fragment.line_end,
            c.rules.join(","),
        ))
    });

    let mut attempts = bucket.attempts;
    attempts.sort_by(|a, b| {
        (&a.classification_id, a.strategy as u8).cmp(&(&b.classification_id, b.strategy as u8))
    });
    let mut seen_attempts = HashSet::new();
    attempts.retain(|a| seen_attempts.insert(a.id.clone()));

    let mut external = bucket.external;
    let mut seen_external = HashSet::new();
    external
        .findings
        .retain(|f| seen_external.insert((f.file.clone(), f.line, f.rule_id.clone())));

    let mut summary = ProjectSummary::tally(&classifications, &attempts);
    summary.fragments = bucket.fragments;

    ProjectReport {
        project,
        summary,
        classifications,
        attempts,
        external,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AttackStrategy, CipherAlgorithm, CipherCallSite, CipherMode, Confidence, Evidence,
        ExternalFinding, FragmentId, Label, Outcome, ResolutionPath, Severity,
    };

    fn classification(project: &str, file: &str, line: u32) -> Classification {
        let site = CipherCallSite {
            fragment: FragmentId {
                project: project.into(),
                file: file.into(),
                line_start: 1,
                line_end: 50,
            },
            line,
            algorithm: CipherAlgorithm::Aes,
            mode_expr: "AES.MODE_ECB".into(),
            mode: Some(CipherMode::Ecb),
            resolution: ResolutionPath::Literal,
            key_expr: None,
            key_bits: None,
            key_is_random_per_call: false,
            iv_expr: None,
            enclosing_function: None,
            encrypt_calls: 1,
        };
        Classification::new(site, Label::UnsafeEcb, vec!["ECB-MODE".into()], Confidence::High)
    }

    #[test]
    fn test_duplicate_classifications_collapse() {
        let aggregator = FindingAggregator::new();
        aggregator.record_classifications(
            "acme/widgets",
            vec![
                classification("acme/widgets", "a.py", 10),
                classification("acme/widgets", "a.py", 10),
                classification("acme/widgets", "a.py", 20),
            ],
        );

        let report = aggregator.finalize("run-1".into());
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].classifications.len(), 2);
    }

    #[test]
    fn test_projects_isolated_and_sorted() {
        let aggregator = FindingAggregator::new();
        aggregator.record_classifications("zeta/z", vec![classification("zeta/z", "z.py", 1)]);
        aggregator.record_classifications("alpha/a", vec![classification("alpha/a", "a.py", 1)]);

        let report = aggregator.finalize("run-1".into());
        assert_eq!(report.projects.len(), 2);
        assert_eq!(report.projects[0].project, "alpha/a");
        assert_eq!(report.projects[1].project, "zeta/z");
    }

    #[test]
    fn test_attempts_and_summary() {
        let aggregator = FindingAggregator::new();
        let cls = classification("acme/widgets", "a.py", 10);
        let attempt = ExploitAttempt::new(
            &cls,
            AttackStrategy::Distinguishability,
            Outcome::ConfirmedExploitable,
            Evidence::default(),
        );
        aggregator.note_fragment("acme/widgets");
        aggregator.record_classifications("acme/widgets", vec![cls]);
        aggregator.record_attempts("acme/widgets", vec![attempt.clone(), attempt]);

        let report = aggregator.finalize("run-1".into());
        let project = &report.projects[0];
        assert_eq!(project.attempts.len(), 1, "attempts dedup by id");
        assert_eq!(project.summary.fragments, 1);
        assert_eq!(project.summary.unsafe_ecb, 1);
        assert_eq!(project.summary.confirmed_exploitable, 1);
        assert_eq!(report.confirmed_total(), 1);
    }

    #[test]
    fn test_external_findings_dedup() {
        let aggregator = FindingAggregator::new();
        let finding = ExternalFinding {
            rule_id: "B305".into(),
            file: "a.py".into(),
            line: 12,
            severity: Severity::High,
        };
        aggregator.attach_external(
            "acme/widgets",
            ExternalSection {
                available: true,
                findings: vec![finding.clone(), finding],
            },
        );

        let report = aggregator.finalize("run-1".into());
        assert_eq!(report.projects[0].external.findings.len(), 1);
        assert!(report.projects[0].external.available);
    }

    #[test]
    fn test_empty_external_section_by_default() {
        let aggregator = FindingAggregator::new();
        aggregator.note_fragment("acme/widgets");
        let report = aggregator.finalize("run-1".into());
        assert!(!report.projects[0].external.available);
        assert!(report.projects[0].external.findings.is_empty());
    }
}
