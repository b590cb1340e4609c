//! Pipeline orchestration
//!
//! Wires the classifier, verifier, scanner bridge, and aggregator together.
//! Per-project pipelines are independent and run in parallel; within a
//! project, fragment classification is data-parallel. Nothing that happens
//! to one fragment or project can abort the others; the only surfaced
//! failure is starting a run with no fragments at all.

use crate::classifier::UsageClassifier;
use crate::config::ProjectFilter;
use crate::errors::EngineError;
use crate::models::{CodeFragment, Label, RunReport};
use crate::report::FindingAggregator;
use crate::scanner::ScannerBridge;
use crate::verifier::ExploitVerifier;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Progress callback: (fragments processed, fragments total)
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Runs the full detection and verification pipeline
pub struct Pipeline {
    classifier: UsageClassifier,
    verifier: ExploitVerifier,
    scanner: Option<ScannerBridge>,
    workers: usize,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(classifier: UsageClassifier, verifier: ExploitVerifier) -> Self {
        Self {
            classifier,
            verifier,
            scanner: None,
            workers: 0,
            progress: None,
        }
    }

    /// Attach an external scanner bridge
    pub fn with_scanner(mut self, scanner: ScannerBridge) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// Number of worker threads (0 = rayon default)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Execute a run over the supplied fragments.
    ///
    /// `scan_root` optionally names a (project, path) pair the external
    /// scanner should be pointed at; its result is merged into that
    /// project's report section.
    pub fn run(
        &self,
        fragments: Vec<CodeFragment>,
        filter: &ProjectFilter,
        scan_root: Option<(&str, &Path)>,
    ) -> Result<RunReport, EngineError> {
        if fragments.is_empty() {
            return Err(EngineError::NoFragments);
        }

        let mut by_project: BTreeMap<String, Vec<CodeFragment>> = BTreeMap::new();
        for fragment in fragments {
            if !filter.should_process(&fragment.id.project) {
                debug!(project = %fragment.id.project, "project filtered out");
                continue;
            }
            by_project
                .entry(fragment.id.project.clone())
                .or_default()
                .push(fragment);
        }

        let total: usize = by_project.values().map(Vec::len).sum();
        let processed = AtomicUsize::new(0);
        let aggregator = FindingAggregator::new();

        let work = |projects: &BTreeMap<String, Vec<CodeFragment>>| {
            projects.par_iter().for_each(|(project, fragments)| {
                fragments.par_iter().for_each(|fragment| {
                    self.process_fragment(project, fragment, &aggregator);
                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(callback) = &self.progress {
                        callback(done, total);
                    }
                });
            });
        };

        if self.workers > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
            {
                Ok(pool) => pool.install(|| work(&by_project)),
                Err(e) => {
                    warn!(error = %e, "failed to build worker pool, using the default");
                    work(&by_project);
                }
            }
        } else {
            work(&by_project);
        }

        // The scanner bridge is one bounded blocking call; its failure only
        // degrades the external section
        if let (Some(scanner), Some((project, path))) = (&self.scanner, scan_root) {
            if by_project.contains_key(project) {
                aggregator.attach_external(project, scanner.scan(path));
            }
        }

        let report = aggregator.finalize(uuid::Uuid::new_v4().to_string());
        info!(
            projects = report.projects.len(),
            unsafe_ecb = report.unsafe_ecb_total(),
            confirmed = report.confirmed_total(),
            "run complete"
        );
        Ok(report)
    }

    /// Classify one fragment and verify its unsafe-ECB call sites
    fn process_fragment(
        &self,
        project: &str,
        fragment: &CodeFragment,
        aggregator: &FindingAggregator,
    ) {
        aggregator.note_fragment(project);

        let classifications = self.classifier.classify_fragment(fragment);
        if classifications.is_empty() {
            return;
        }

        let mut attempts = Vec::new();
        for classification in &classifications {
            if classification.label == Label::UnsafeEcb {
                attempts.extend(self.verifier.verify(classification, fragment));
            }
        }

        aggregator.record_classifications(project, classifications);
        if !attempts.is_empty() {
            aggregator.record_attempts(project, attempts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;
    use crate::verifier::sandbox::SandboxConfig;

    fn static_pipeline() -> Pipeline {
        Pipeline::new(UsageClassifier::new(), ExploitVerifier::disabled())
    }

    fn ecb_fragment(project: &str) -> CodeFragment {
        CodeFragment::new(
            project,
            "crypto.py",
            1,
            5,
            "KEY = b'0123456789abcdef'\n\
             c = AES.new(KEY, AES.MODE_ECB)\n\
             a = c.encrypt(m1)\n\
             b = c.encrypt(m2)\n",
        )
    }

    #[test]
    fn test_empty_run_is_a_configuration_error() {
        let result = static_pipeline().run(Vec::new(), &ProjectFilter::default(), None);
        assert!(matches!(result, Err(EngineError::NoFragments)));
    }

    #[test]
    fn test_run_classifies_and_verifies() {
        let report = static_pipeline()
            .run(vec![ecb_fragment("acme/widgets")], &ProjectFilter::default(), None)
            .unwrap();

        assert_eq!(report.projects.len(), 1);
        let project = &report.projects[0];
        assert_eq!(project.summary.unsafe_ecb, 1);
        // Key reuse across two encrypt calls: statically confirmed
        assert_eq!(project.summary.confirmed_exploitable, 1);
        assert_eq!(project.attempts[0].outcome, Outcome::ConfirmedExploitable);
    }

    #[test]
    fn test_projects_processed_independently() {
        let fragments = vec![
            ecb_fragment("acme/widgets"),
            CodeFragment::new("beta/app", "ok.py", 1, 2, "c = AES.new(get_random_bytes(32), AES.MODE_GCM)\n"),
            CodeFragment::new("gamma/junk", "broken.py", 1, 2, "s = '''\nnot even python\n"),
        ];
        let report = static_pipeline()
            .run(fragments, &ProjectFilter::default(), None)
            .unwrap();

        assert_eq!(report.projects.len(), 3);
        assert_eq!(report.projects[0].project, "acme/widgets");
        assert_eq!(report.projects[0].summary.unsafe_ecb, 1);
        assert_eq!(report.projects[1].summary.safe, 1);
        // The junk project degrades to nothing but does not poison the run
        assert_eq!(report.projects[2].summary.unsafe_ecb, 0);
    }

    #[test]
    fn test_filtered_projects_are_skipped() {
        let mut filter = ProjectFilter::default();
        filter.mark_processed("acme/widgets");

        let fragments = vec![ecb_fragment("acme/widgets"), ecb_fragment("other/app")];
        let report = static_pipeline().run(fragments, &filter, None).unwrap();
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.projects[0].project, "other/app");
    }

    #[test]
    fn test_sandboxed_verifier_degrades_without_interpreter() {
        // A verifier whose interpreter does not exist must still complete
        // the run through the static strategy
        let verifier = ExploitVerifier::new(SandboxConfig {
            python: "definitely-not-python-xyz".into(),
            wall_secs: 2,
            cpu_secs: 1,
        });
        let pipeline = Pipeline::new(UsageClassifier::new(), verifier);
        let report = pipeline
            .run(vec![ecb_fragment("acme/widgets")], &ProjectFilter::default(), None)
            .unwrap();
        assert_eq!(report.projects[0].summary.confirmed_exploitable, 1);
    }
}
