//! Token-level fallback scanner
//!
//! Used when tree-sitter cannot produce a usable tree for a fragment.
//! Matches cipher-factory calls line by line with regexes; every site it
//! produces carries the `Fallback` resolution path, which the decision
//! table caps at low confidence.

use crate::models::{CipherAlgorithm, CipherCallSite, CodeFragment, ResolutionPath};
use regex::Regex;
use std::sync::OnceLock;

static FACTORY: OnceLock<Regex> = OnceLock::new();
static MODE_TOKEN: OnceLock<Regex> = OnceLock::new();
static ENCRYPT_CALL: OnceLock<Regex> = OnceLock::new();

fn factory() -> &'static Regex {
    FACTORY.get_or_init(|| {
        Regex::new(r"\b(?P<alg>AES|DES3|DES|ARC2|ARC4|Blowfish)\s*\.\s*new\s*\(").unwrap()
    })
}

fn mode_token() -> &'static Regex {
    MODE_TOKEN.get_or_init(|| Regex::new(r"\bMODE_(?P<mode>[A-Z0-9]+)\b").unwrap())
}

fn encrypt_call() -> &'static Regex {
    ENCRYPT_CALL.get_or_init(|| Regex::new(r"\.\s*encrypt\s*\(").unwrap())
}

/// Scan a fragment the parser could not handle
pub fn scan(fragment: &CodeFragment) -> Vec<CipherCallSite> {
    let encrypt_calls = encrypt_call().find_iter(&fragment.source).count() as u32;
    let mut sites = Vec::new();

    for (row, line) in fragment.source.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            continue;
        }

        for capture in factory().captures_iter(line) {
            let algorithm = match &capture["alg"] {
                "AES" => CipherAlgorithm::Aes,
                "DES" => CipherAlgorithm::Des,
                "DES3" => CipherAlgorithm::TripleDes,
                "ARC2" => CipherAlgorithm::Rc2,
                "ARC4" => CipherAlgorithm::Rc4,
                "Blowfish" => CipherAlgorithm::Blowfish,
                other => CipherAlgorithm::Other(other.to_string()),
            };

            // Only a mode token on the same line is trusted; anything else
            // stays unresolved
            let (mode, mode_expr) = match mode_token().captures(line) {
                Some(m) => (
                    crate::classifier::resolve::mode_from_token(&m["mode"]),
                    m.get(0).map(|t| t.as_str().to_string()).unwrap_or_default(),
                ),
                None => (None, String::new()),
            };

            sites.push(CipherCallSite {
                fragment: fragment.id.clone(),
                line: fragment.id.line_start + row as u32,
                algorithm,
                mode_expr,
                mode,
                resolution: ResolutionPath::Fallback,
                key_expr: None,
                key_bits: None,
                key_is_random_per_call: false,
                iv_expr: None,
                enclosing_function: None,
                encrypt_calls,
            });
        }
    }
    sites
}
