//! Usage Classifier
//!
//! Turns each extracted `CodeFragment` into zero or more cipher call sites
//! and exactly one `Classification` per call site. Parsing uses tree-sitter;
//! fragments the parser cannot handle take the token-level fallback path at
//! low confidence. Classification is deterministic: the same fragment always
//! yields the same output.

pub(crate) mod callsites;
mod fallback;
pub(crate) mod resolve;

use crate::models::{
    CipherCallSite, Classification, CodeFragment, Confidence, Label, ResolutionPath,
};
use tracing::debug;

/// Rule identifiers attached to classifications
pub mod rules {
    pub const ECB_MODE: &str = "ECB-MODE";
    pub const MODE_OK: &str = "MODE-OK";
    pub const BROKEN_ALGORITHM: &str = "BROKEN-ALGORITHM";
    pub const WEAK_KEY: &str = "WEAK-KEY";
    pub const UNVERIFIED_KEY: &str = "UNVERIFIED-KEY";
    pub const MODE_UNRESOLVED: &str = "MODE-UNRESOLVED";
    pub const KEY_UNKNOWN: &str = "KEY-UNKNOWN";
}

/// Classifies cipher usage in extracted fragments
pub struct UsageClassifier {
    /// Cap on call sites lifted from a single fragment
    max_call_sites: usize,
}

impl Default for UsageClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageClassifier {
    pub fn new() -> Self {
        Self { max_call_sites: 64 }
    }

    pub fn with_max_call_sites(mut self, max: usize) -> Self {
        self.max_call_sites = max;
        self
    }

    /// Classify every cipher call site in a fragment.
    ///
    /// Never fails: a parse failure is recovered through the fallback
    /// scanner, and a fragment without cipher constructions yields an empty
    /// vector.
    pub fn classify_fragment(&self, fragment: &CodeFragment) -> Vec<Classification> {
        let mut sites = match callsites::parse_fragment(&fragment.source) {
            Ok(tree) => {
                let sites = callsites::extract_call_sites(fragment, &tree);
                if sites.is_empty() && tree.root_node().has_error() {
                    debug!(fragment = %fragment.id, "syntax errors and no call sites, using fallback scanner");
                    fallback::scan(fragment)
                } else {
                    sites
                }
            }
            Err(e) => {
                debug!(fragment = %fragment.id, error = %e, "parse failure, using fallback scanner");
                fallback::scan(fragment)
            }
        };
        sites.truncate(self.max_call_sites);

        sites
            .into_iter()
            .map(|site| {
                let (label, rule_list, confidence) = decide(&site);
                Classification::new(site, label, rule_list, confidence)
            })
            .collect()
    }
}

/// The decision table.
///
/// | resolved mode | key known >= 128 bits | label |
/// |---|---|---|
/// | ECB | any | unsafe-ECB |
/// | CBC/CTR/GCM/other AEAD | yes | safe |
/// | CBC/CTR/other non-AEAD | no | unsafe-other (weak key) |
/// | unresolved | - | indeterminate |
///
/// Broken algorithms (DES/3DES/RC2/RC4/Blowfish) short-circuit the mode
/// rows entirely.
fn decide(site: &CipherCallSite) -> (Label, Vec<String>, Confidence) {
    let base = confidence_for(site.resolution);

    if site.algorithm.is_broken() {
        return (
            Label::UnsafeOther,
            vec![rules::BROKEN_ALGORITHM.to_string()],
            base,
        );
    }

    let Some(mode) = &site.mode else {
        return (
            Label::Indeterminate,
            vec![rules::MODE_UNRESOLVED.to_string()],
            Confidence::Low,
        );
    };

    if *mode == crate::models::CipherMode::Ecb {
        return (Label::UnsafeEcb, vec![rules::ECB_MODE.to_string()], base);
    }

    match site.key_bits {
        Some(bits) if bits >= 128 => (Label::Safe, vec![rules::MODE_OK.to_string()], base),
        Some(_) => (Label::UnsafeOther, vec![rules::WEAK_KEY.to_string()], base),
        None if mode.is_aead() => (
            Label::Indeterminate,
            vec![rules::KEY_UNKNOWN.to_string()],
            Confidence::Low,
        ),
        None => (
            Label::UnsafeOther,
            vec![rules::WEAK_KEY.to_string(), rules::UNVERIFIED_KEY.to_string()],
            base.min(Confidence::Medium),
        ),
    }
}

fn confidence_for(path: ResolutionPath) -> Confidence {
    match path {
        ResolutionPath::Literal => Confidence::High,
        ResolutionPath::AliasHop | ResolutionPath::Conditional => Confidence::Medium,
        ResolutionPath::Fallback | ResolutionPath::Unresolved => Confidence::Low,
    }
}
