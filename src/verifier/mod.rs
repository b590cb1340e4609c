//! Exploit Verifier
//!
//! Detection says an API call looks wrong; verification demonstrates the
//! weakness is reachable. For every unsafe-ECB classification the verifier
//! applies attack strategies in order, stopping at the first confirmation:
//!
//! 1. Block-repetition probe: when the extracted routine can be driven in
//!    isolation, encrypt repeated plaintext blocks through it and look for
//!    identical ciphertext blocks.
//! 2. Distinguishability probe: a static proof from key reuse across the
//!    encryption calls observed in the fragment; nothing is executed.
//!
//! If neither demonstrates anything the attempt is recorded inconclusive:
//! the mode is unsafe in principle but no exploitable instance was shown
//! from this fragment alone.

pub mod oracle;
pub mod probes;
pub mod sandbox;

use crate::models::{
    AttackStrategy, Classification, CodeFragment, Evidence, ExploitAttempt, Label, Outcome,
};
use oracle::EncryptionOracle;
use sandbox::{Harness, HarnessOracle, PythonSandbox, SandboxConfig};
use tracing::debug;

/// Verifies that unsafe-ECB call sites are practically exploitable
pub struct ExploitVerifier {
    sandbox: Option<PythonSandbox>,
}

impl ExploitVerifier {
    /// Verifier with sandboxed execution enabled
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            sandbox: Some(PythonSandbox::new(config)),
        }
    }

    /// Static-only verifier; strategy 1 is never attempted
    pub fn disabled() -> Self {
        Self { sandbox: None }
    }

    /// Attempt to demonstrate exploitability for one classification.
    ///
    /// Returns one attempt per applied strategy. Classifications that are
    /// not unsafe-ECB produce no attempts at all; that invariant is what
    /// keeps every `ExploitAttempt` tied to an unsafe-ECB record.
    pub fn verify(
        &self,
        classification: &Classification,
        fragment: &CodeFragment,
    ) -> Vec<ExploitAttempt> {
        if classification.label != Label::UnsafeEcb {
            return Vec::new();
        }

        let mut attempts = Vec::new();

        if let Some(sandbox) = &self.sandbox {
            if let Some(harness) = Harness::plan(&classification.call_site) {
                if sandbox.available() {
                    let mut oracle = HarnessOracle::new(sandbox, &harness, fragment);
                    let attempt = block_repetition_probe(&mut oracle, classification);
                    let confirmed = attempt.outcome == Outcome::ConfirmedExploitable;
                    attempts.push(attempt);
                    if confirmed {
                        return attempts;
                    }
                } else {
                    debug!("python interpreter unavailable, skipping block-repetition probe");
                }
            }
        }

        attempts.push(distinguishability_probe(classification));
        attempts
    }
}

/// Strategy 1: drive the extracted routine with crafted plaintext.
///
/// Deterministic and key-independent: repeated plaintext blocks collide in
/// the ciphertext under ECB no matter which key the routine uses.
pub fn block_repetition_probe(
    oracle: &mut dyn EncryptionOracle,
    classification: &Classification,
) -> ExploitAttempt {
    let plaintext = probes::probe_plaintext(probes::BLOCK_SIZE);

    match oracle.encrypt(&plaintext) {
        Ok(ciphertext) => {
            let analysis = probes::analyze_blocks(&ciphertext, probes::BLOCK_SIZE);
            let outcome = if analysis.leaks() {
                Outcome::ConfirmedExploitable
            } else {
                Outcome::NotExploitable
            };

            let mut evidence = Evidence {
                repeated_blocks: analysis.repeated,
                timed_out: false,
                notes: Vec::new(),
            };
            if outcome == Outcome::NotExploitable {
                evidence.notes.push(
                    "repeated plaintext blocks did not produce repeated ciphertext blocks"
                        .to_string(),
                );
            }

            let mut attempt = ExploitAttempt::new(
                classification,
                AttackStrategy::BlockRepetition,
                outcome,
                evidence,
            );
            attempt.plaintext_hex = Some(crate::models::hex_lower(&plaintext));
            attempt.ciphertext_hex = Some(crate::models::hex_lower(&ciphertext));
            attempt
        }
        Err(failure) => {
            let evidence = Evidence {
                repeated_blocks: Vec::new(),
                timed_out: failure.timed_out,
                notes: vec![failure.message],
            };
            ExploitAttempt::new(
                classification,
                AttackStrategy::BlockRepetition,
                Outcome::Inconclusive,
                evidence,
            )
        }
    }
}

/// Strategy 2: prove distinguishability statically.
///
/// When the same key serves multiple encryption calls under ECB, equal
/// plaintext blocks are guaranteed to collide across those calls by
/// construction of the mode; no execution is needed.
pub fn distinguishability_probe(classification: &Classification) -> ExploitAttempt {
    let site = &classification.call_site;

    let (outcome, note) = if site.encrypt_calls >= 2 && !site.key_is_random_per_call {
        (
            Outcome::ConfirmedExploitable,
            format!(
                "key is reused across {} encryption calls; under ECB, equal plaintext \
                 blocks across those calls yield identical ciphertext blocks by construction",
                site.encrypt_calls
            ),
        )
    } else if site.key_is_random_per_call {
        (
            Outcome::Inconclusive,
            "key is freshly generated per construction; no repetition is observable \
             across calls from this fragment alone"
                .to_string(),
        )
    } else {
        (
            Outcome::Inconclusive,
            "a single isolated encryption invocation offers no replay surface to \
             demonstrate repetition statically"
                .to_string(),
        )
    };

    ExploitAttempt::new(
        classification,
        AttackStrategy::Distinguishability,
        outcome,
        Evidence {
            repeated_blocks: Vec::new(),
            timed_out: false,
            notes: vec![note],
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CipherAlgorithm, CipherCallSite, CipherMode, Confidence, FragmentId, ResolutionPath,
    };
    use super::oracle::{OracleFailure, ReferenceOracle};

    fn ecb_classification(encrypt_calls: u32, random_key: bool) -> Classification {
        let site = CipherCallSite {
            fragment: FragmentId {
                project: "p".into(),
                file: "f.py".into(),
                line_start: 1,
                line_end: 30,
            },
            line: 4,
            algorithm: CipherAlgorithm::Aes,
            mode_expr: "AES.MODE_ECB".into(),
            mode: Some(CipherMode::Ecb),
            resolution: ResolutionPath::Literal,
            key_expr: Some("KEY".into()),
            key_bits: Some(128),
            key_is_random_per_call: random_key,
            iv_expr: None,
            enclosing_function: None,
            encrypt_calls,
        };
        Classification::new(
            site,
            Label::UnsafeEcb,
            vec!["ECB-MODE".into()],
            Confidence::High,
        )
    }

    #[test]
    fn test_probe_confirms_ecb_oracle() {
        let classification = ecb_classification(1, false);
        let mut oracle = ReferenceOracle::ecb(b"fixed key".to_vec());
        let attempt = block_repetition_probe(&mut oracle, &classification);
        assert_eq!(attempt.outcome, Outcome::ConfirmedExploitable);
        assert!(!attempt.evidence.repeated_blocks.is_empty());
        assert!(attempt.ciphertext_hex.is_some());
    }

    #[test]
    fn test_probe_outcome_is_key_independent() {
        // The weakness is structural; a different random key per run must
        // not change the verdict
        let classification = ecb_classification(1, false);
        for key in [b"key-a".to_vec(), b"key-b".to_vec(), b"key-c".to_vec()] {
            let mut oracle = ReferenceOracle::ecb(key);
            let attempt = block_repetition_probe(&mut oracle, &classification);
            assert_eq!(attempt.outcome, Outcome::ConfirmedExploitable);
        }
    }

    #[test]
    fn test_probe_rejects_diffusing_oracle() {
        let classification = ecb_classification(1, false);
        let mut oracle = ReferenceOracle::chained(b"fixed key".to_vec());
        let attempt = block_repetition_probe(&mut oracle, &classification);
        assert_eq!(attempt.outcome, Outcome::NotExploitable);
    }

    struct FailingOracle {
        timed_out: bool,
    }

    impl EncryptionOracle for FailingOracle {
        fn encrypt(&mut self, _plaintext: &[u8]) -> Result<Vec<u8>, OracleFailure> {
            if self.timed_out {
                Err(OracleFailure::timeout("driver exceeded 10s wall clock"))
            } else {
                Err(OracleFailure::new("NameError: name 'pad' is not defined"))
            }
        }
    }

    #[test]
    fn test_probe_failure_is_inconclusive() {
        let classification = ecb_classification(1, false);
        let attempt =
            block_repetition_probe(&mut FailingOracle { timed_out: false }, &classification);
        assert_eq!(attempt.outcome, Outcome::Inconclusive);
        assert!(!attempt.evidence.timed_out);
    }

    #[test]
    fn test_probe_timeout_tagged_in_evidence() {
        let classification = ecb_classification(1, false);
        let attempt =
            block_repetition_probe(&mut FailingOracle { timed_out: true }, &classification);
        assert_eq!(attempt.outcome, Outcome::Inconclusive);
        assert!(attempt.evidence.timed_out);
    }

    #[test]
    fn test_distinguishability_confirms_key_reuse() {
        let classification = ecb_classification(3, false);
        let attempt = distinguishability_probe(&classification);
        assert_eq!(attempt.outcome, Outcome::ConfirmedExploitable);
        assert_eq!(attempt.strategy, AttackStrategy::Distinguishability);
    }

    #[test]
    fn test_distinguishability_inconclusive_for_fresh_keys() {
        let classification = ecb_classification(1, true);
        let attempt = distinguishability_probe(&classification);
        assert_eq!(attempt.outcome, Outcome::Inconclusive);
    }

    #[test]
    fn test_verifier_skips_non_ecb_classifications() {
        let mut classification = ecb_classification(2, false);
        classification.label = Label::Safe;
        let verifier = ExploitVerifier::disabled();
        let fragment = CodeFragment::new("p", "f.py", 1, 30, "x = 1\n");
        assert!(verifier.verify(&classification, &fragment).is_empty());
    }

    #[test]
    fn test_disabled_verifier_still_applies_static_strategy() {
        let classification = ecb_classification(2, false);
        let verifier = ExploitVerifier::disabled();
        let fragment = CodeFragment::new("p", "f.py", 1, 30, "x = 1\n");
        let attempts = verifier.verify(&classification, &fragment);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].strategy, AttackStrategy::Distinguishability);
        assert_eq!(attempts[0].outcome, Outcome::ConfirmedExploitable);
        assert_eq!(attempts[0].classification_id, classification.id);
    }
}
