//! Core data models for ecbscan
//!
//! These models represent the units flowing through the pipeline:
//! extracted code fragments, cipher call sites, classifications,
//! exploit attempts, and the per-project report they aggregate into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Generate a deterministic record ID based on content hash.
///
/// Stable IDs across runs enable:
/// - Tracking a call site over time (fixed vs new vs recurring)
/// - Deduplication by ID inside the aggregator
/// - Regression tests that diff whole reports
///
/// The ID is a 16-character hex string derived from hashing the record's
/// identifying fields. DefaultHasher is intentionally not used because it
/// is not stable across Rust versions.
pub fn deterministic_record_id(kind: &str, file: &str, line: u32, detail: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"\n");
    hasher.update(file.as_bytes());
    hasher.update(b"\n");
    hasher.update(line.to_le_bytes());
    hasher.update(b"\n");
    hasher.update(detail.as_bytes());
    let digest = hasher.finalize();
    hex_lower(&digest)[..16].to_string()
}

/// Lowercase hex encoding without an extra dependency.
pub fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Location of an extracted fragment inside its project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId {
    pub project: String,
    pub file: PathBuf,
    pub line_start: u32,
    pub line_end: u32,
}

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}",
            self.project,
            self.file.display(),
            self.line_start,
            self.line_end
        )
    }
}

/// A discrete source fragment believed to contain cryptographic operations.
///
/// Fragments arrive from the extractor interface and are immutable for the
/// lifetime of the run that received them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFragment {
    pub id: FragmentId,
    pub source: String,
}

impl CodeFragment {
    pub fn new(
        project: impl Into<String>,
        file: impl Into<PathBuf>,
        line_start: u32,
        line_end: u32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: FragmentId {
                project: project.into(),
                file: file.into(),
                line_start,
                line_end,
            },
            source: source.into(),
        }
    }
}

/// Cipher algorithm named at a construction site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherAlgorithm {
    Aes,
    Des,
    TripleDes,
    Rc2,
    Rc4,
    Blowfish,
    Other(String),
}

impl CipherAlgorithm {
    /// Algorithms broken regardless of mode or key length
    pub fn is_broken(&self) -> bool {
        matches!(
            self,
            CipherAlgorithm::Des
                | CipherAlgorithm::TripleDes
                | CipherAlgorithm::Rc2
                | CipherAlgorithm::Rc4
                | CipherAlgorithm::Blowfish
        )
    }
}

impl std::fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherAlgorithm::Aes => write!(f, "AES"),
            CipherAlgorithm::Des => write!(f, "DES"),
            CipherAlgorithm::TripleDes => write!(f, "3DES"),
            CipherAlgorithm::Rc2 => write!(f, "RC2"),
            CipherAlgorithm::Rc4 => write!(f, "RC4"),
            CipherAlgorithm::Blowfish => write!(f, "Blowfish"),
            CipherAlgorithm::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Block cipher mode named (or resolved) at a construction site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    Ecb,
    Cbc,
    Cfb,
    Ofb,
    Ctr,
    Gcm,
    Eax,
    Ccm,
    Siv,
    Ocb,
    OpenPgp,
    Other(String),
}

impl CipherMode {
    /// Authenticated modes provide both confidentiality and integrity
    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            CipherMode::Gcm | CipherMode::Eax | CipherMode::Ccm | CipherMode::Siv | CipherMode::Ocb
        )
    }
}

impl std::fmt::Display for CipherMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherMode::Ecb => write!(f, "ECB"),
            CipherMode::Cbc => write!(f, "CBC"),
            CipherMode::Cfb => write!(f, "CFB"),
            CipherMode::Ofb => write!(f, "OFB"),
            CipherMode::Ctr => write!(f, "CTR"),
            CipherMode::Gcm => write!(f, "GCM"),
            CipherMode::Eax => write!(f, "EAX"),
            CipherMode::Ccm => write!(f, "CCM"),
            CipherMode::Siv => write!(f, "SIV"),
            CipherMode::Ocb => write!(f, "OCB"),
            CipherMode::OpenPgp => write!(f, "OpenPGP"),
            CipherMode::Other(name) => write!(f, "{}", name),
        }
    }
}

/// How the mode argument was resolved to a concrete mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// The argument was a literal constant at the call site
    Literal,
    /// Resolved through exactly one module-level alias
    AliasHop,
    /// A conditional expression whose branches were all literal
    Conditional,
    /// Produced by the token-level fallback scanner
    Fallback,
    /// Could not be resolved statically
    Unresolved,
}

/// Enclosing function of a call site, recorded for harness synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclosingFunction {
    pub name: String,
    pub parameters: Vec<String>,
}

/// Structured extraction of one cipher construction from a fragment.
///
/// Many call sites may derive from one fragment (loops, multiple calls);
/// each gets its own record and its own classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherCallSite {
    pub fragment: FragmentId,
    /// 1-indexed line of the construction inside the fragment's file
    pub line: u32,
    pub algorithm: CipherAlgorithm,
    /// Source text of the mode argument as written
    pub mode_expr: String,
    /// Statically resolved mode, if resolution succeeded
    pub mode: Option<CipherMode>,
    pub resolution: ResolutionPath,
    /// Source text of the key-material expression
    pub key_expr: Option<String>,
    /// Key length in bits when statically determinable
    pub key_bits: Option<u32>,
    /// Key expression generates fresh random bytes per construction
    pub key_is_random_per_call: bool,
    /// IV/nonce expression if one was passed
    pub iv_expr: Option<String>,
    /// Function the construction appears in, if any
    pub enclosing_function: Option<EnclosingFunction>,
    /// Number of `.encrypt(...)` calls observed on the constructed object
    pub encrypt_calls: u32,
}

impl CipherCallSite {
    /// Stable identifier for dedup and cross-referencing
    pub fn record_id(&self) -> String {
        deterministic_record_id(
            "callsite",
            &self.fragment.file.display().to_string(),
            self.line,
            &self.mode_expr,
        )
    }
}

/// Classification label for a cipher call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Label {
    Safe,
    UnsafeEcb,
    UnsafeOther,
    Indeterminate,
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Safe => write!(f, "safe"),
            Label::UnsafeEcb => write!(f, "unsafe-ECB"),
            Label::UnsafeOther => write!(f, "unsafe-other"),
            Label::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Confidence in a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Verdict for one cipher call site.
///
/// Classifications are immutable once created. A correction is expressed as
/// a new record whose `supersedes` field names the record it replaces, so
/// the audit trail of why a call site was judged unsafe is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub id: String,
    pub call_site: CipherCallSite,
    pub label: Label,
    /// Rule IDs that matched, e.g. "ECB-MODE", "WEAK-KEY"
    pub rules: Vec<String>,
    pub confidence: Confidence,
    /// ID of an earlier classification this record replaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

impl Classification {
    pub fn new(
        call_site: CipherCallSite,
        label: Label,
        rules: Vec<String>,
        confidence: Confidence,
    ) -> Self {
        let id = deterministic_record_id(
            "classification",
            &call_site.fragment.file.display().to_string(),
            call_site.line,
            &format!("{}|{}", label, rules.join(",")),
        );
        Self {
            id,
            call_site,
            label,
            rules,
            confidence,
            supersedes: None,
        }
    }

    /// Create a corrected classification that supersedes this one
    pub fn superseded_by(
        &self,
        label: Label,
        rules: Vec<String>,
        confidence: Confidence,
    ) -> Classification {
        let mut next = Classification::new(self.call_site.clone(), label, rules, confidence);
        next.supersedes = Some(self.id.clone());
        next
    }
}

/// Attack strategy applied by the exploit verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackStrategy {
    /// Encrypt repeated plaintext blocks and look for identical ciphertext blocks
    BlockRepetition,
    /// Static proof from key reuse across observed encryption calls
    Distinguishability,
}

impl std::fmt::Display for AttackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttackStrategy::BlockRepetition => write!(f, "block-repetition"),
            AttackStrategy::Distinguishability => write!(f, "distinguishability"),
        }
    }
}

/// Outcome of one exploit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    ConfirmedExploitable,
    Inconclusive,
    NotExploitable,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::ConfirmedExploitable => write!(f, "confirmed-exploitable"),
            Outcome::Inconclusive => write!(f, "inconclusive"),
            Outcome::NotExploitable => write!(f, "not-exploitable"),
        }
    }
}

/// A pair of ciphertext block indices that carried identical bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedBlockPair {
    pub left: usize,
    pub right: usize,
}

/// Evidence gathered during an exploit attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    /// Ciphertext block index pairs that matched bit for bit
    #[serde(default)]
    pub repeated_blocks: Vec<RepeatedBlockPair>,
    /// The sandbox hit its wall-clock or CPU bound
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// One attempt to demonstrate that an unsafe-ECB call site is exploitable.
///
/// Produced only for classifications labeled unsafe-ECB, at most once per
/// strategy per call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitAttempt {
    pub id: String,
    /// The unsafe-ECB classification this attempt was made for
    pub classification_id: String,
    pub strategy: AttackStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext_hex: Option<String>,
    pub outcome: Outcome,
    pub evidence: Evidence,
}

impl ExploitAttempt {
    pub fn new(
        classification: &Classification,
        strategy: AttackStrategy,
        outcome: Outcome,
        evidence: Evidence,
    ) -> Self {
        let id = deterministic_record_id(
            "attempt",
            &classification.call_site.fragment.file.display().to_string(),
            classification.call_site.line,
            &format!("{}|{}", strategy, classification.id),
        );
        Self {
            id,
            classification_id: classification.id.clone(),
            strategy,
            plaintext_hex: None,
            ciphertext_hex: None,
            outcome,
            evidence,
        }
    }
}

/// Severity reported by the external scanner
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// One finding from the external scanner bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalFinding {
    pub rule_id: String,
    pub file: PathBuf,
    pub line: u32,
    pub severity: Severity,
}

/// External-scanner section of a project report.
///
/// `available = false` is a normal configuration state, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalSection {
    pub available: bool,
    #[serde(default)]
    pub findings: Vec<ExternalFinding>,
}

/// Counts per classification label for a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub fragments: usize,
    pub call_sites: usize,
    pub safe: usize,
    pub unsafe_ecb: usize,
    pub unsafe_other: usize,
    pub indeterminate: usize,
    pub confirmed_exploitable: usize,
}

impl ProjectSummary {
    pub fn tally(classifications: &[Classification], attempts: &[ExploitAttempt]) -> Self {
        let mut summary = Self::default();
        summary.call_sites = classifications.len();
        for c in classifications {
            match c.label {
                Label::Safe => summary.safe += 1,
                Label::UnsafeEcb => summary.unsafe_ecb += 1,
                Label::UnsafeOther => summary.unsafe_other += 1,
                Label::Indeterminate => summary.indeterminate += 1,
            }
        }
        summary.confirmed_exploitable = attempts
            .iter()
            .filter(|a| a.outcome == Outcome::ConfirmedExploitable)
            .count();
        summary
    }
}

/// All results for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project: String,
    pub summary: ProjectSummary,
    pub classifications: Vec<Classification>,
    pub attempts: Vec<ExploitAttempt>,
    pub external: ExternalSection,
}

/// The serialized document produced by one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub projects: Vec<ProjectReport>,
}

impl RunReport {
    /// Total confirmed-exploitable attempts across all projects
    pub fn confirmed_total(&self) -> usize {
        self.projects
            .iter()
            .map(|p| p.summary.confirmed_exploitable)
            .sum()
    }

    /// Total unsafe-ECB classifications across all projects
    pub fn unsafe_ecb_total(&self) -> usize {
        self.projects.iter().map(|p| p.summary.unsafe_ecb).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_call_site() -> CipherCallSite {
        CipherCallSite {
            fragment: FragmentId {
                project: "acme/widgets".into(),
                file: "src/crypto.py".into(),
                line_start: 1,
                line_end: 20,
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
            encrypt_calls: 1,
        }
    }

    #[test]
    fn test_deterministic_record_id_stable() {
        let a = deterministic_record_id("classification", "a.py", 3, "unsafe-ECB");
        let b = deterministic_record_id("classification", "a.py", 3, "unsafe-ECB");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = deterministic_record_id("classification", "a.py", 4, "unsafe-ECB");
        assert_ne!(a, c);
    }

    #[test]
    fn test_supersede_preserves_chain() {
        let original = Classification::new(
            sample_call_site(),
            Label::UnsafeEcb,
            vec!["ECB-MODE".into()],
            Confidence::High,
        );
        let corrected =
            original.superseded_by(Label::Indeterminate, vec!["RECHECK".into()], Confidence::Low);

        assert_eq!(corrected.supersedes.as_deref(), Some(original.id.as_str()));
        assert_ne!(corrected.id, original.id);
        assert_eq!(original.supersedes, None);
    }

    #[test]
    fn test_mode_aead() {
        assert!(CipherMode::Gcm.is_aead());
        assert!(CipherMode::Siv.is_aead());
        assert!(!CipherMode::Cbc.is_aead());
        assert!(!CipherMode::Ecb.is_aead());
    }

    #[test]
    fn test_project_summary_tally() {
        let unsafe_cls = Classification::new(
            sample_call_site(),
            Label::UnsafeEcb,
            vec!["ECB-MODE".into()],
            Confidence::High,
        );
        let safe_site = CipherCallSite {
            mode: Some(CipherMode::Gcm),
            mode_expr: "AES.MODE_GCM".into(),
            line: 30,
            ..sample_call_site()
        };
        let safe_cls = Classification::new(
            safe_site,
            Label::Safe,
            vec!["MODE-OK".into()],
            Confidence::High,
        );
        let attempt = ExploitAttempt::new(
            &unsafe_cls,
            AttackStrategy::BlockRepetition,
            Outcome::ConfirmedExploitable,
            Evidence::default(),
        );

        let summary = ProjectSummary::tally(&[unsafe_cls, safe_cls], &[attempt]);
        assert_eq!(summary.call_sites, 2);
        assert_eq!(summary.unsafe_ecb, 1);
        assert_eq!(summary.safe, 1);
        assert_eq!(summary.confirmed_exploitable, 1);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert_eq!("medium".parse::<Severity>(), Ok(Severity::Medium));
        assert!("bogus".parse::<Severity>().is_err());
    }
}
