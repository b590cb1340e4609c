//! Extractor interface adapters
//!
//! The core consumes a sequence of `CodeFragment` records and makes no
//! assumption about how they were obtained. Two adapters are provided at
//! the boundary: a JSONL stream reader for upstream tooling and a directory
//! walker that lifts Python files with cryptographic content out of an
//! unpacked project tree.

use crate::models::CodeFragment;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Keywords that mark a file as worth extracting. Matching is
/// case-insensitive and deliberately broad; the classifier does the precise
/// work downstream.
const CRYPTO_KEYWORDS: &[&str] = &[
    "encrypt", "decrypt", "cipher", "aes", "des", "blowfish", "arc4",
    "crypto", "ecb", "cbc", "gcm", "hazmat",
];

fn looks_cryptographic(source: &str) -> bool {
    let lower = source.to_lowercase();
    CRYPTO_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Read fragments from a JSONL file, one serialized `CodeFragment` per line.
///
/// Malformed lines are skipped with a warning; a bad record from upstream
/// must not abort the rest of the stream.
pub fn read_jsonl(path: &Path) -> Result<Vec<CodeFragment>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open fragment stream: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut fragments = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", number + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CodeFragment>(&line) {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => warn!(line = number + 1, error = %e, "skipping malformed fragment record"),
        }
    }
    Ok(fragments)
}

/// Walk an unpacked project tree and extract Python files that look
/// cryptographic, each as one fragment spanning the whole file.
pub fn walk_project(root: &Path, project: &str) -> Vec<CodeFragment> {
    let mut fragments = Vec::new();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .build();

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }

        let Ok(source) = std::fs::read_to_string(path) else {
            debug!(file = %path.display(), "skipping unreadable file");
            continue;
        };
        if !looks_cryptographic(&source) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let lines = source.lines().count().max(1) as u32;
        fragments.push(CodeFragment::new(
            project,
            relative,
            1,
            lines,
            source,
        ));
    }

    fragments.sort_by(|a, b| a.id.file.cmp(&b.id.file));
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_keyword_prefilter() {
        assert!(looks_cryptographic("from Crypto.Cipher import AES\n"));
        assert!(looks_cryptographic("c = Cipher(algorithms.AES(k), modes.ECB())\n"));
        assert!(!looks_cryptographic("def add(a, b):\n    return a + b\n"));
    }

    #[test]
    fn test_walk_extracts_crypto_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("crypto.py"),
            "cipher = AES.new(key, AES.MODE_ECB)\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("math_utils.py"), "x = 1 + 2\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "aes everywhere\n").unwrap();

        let fragments = walk_project(dir.path(), "acme/widgets");
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].id.project, "acme/widgets");
        assert_eq!(fragments[0].id.file, std::path::PathBuf::from("crypto.py"));
        assert_eq!(fragments[0].id.line_start, 1);
    }

    #[test]
    fn test_jsonl_reader_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fragments.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        let fragment = CodeFragment::new("p", "a.py", 1, 2, "x = AES.new(k, AES.MODE_ECB)\n");
        writeln!(file, "{}", serde_json::to_string(&fragment).unwrap()).unwrap();
        writeln!(file, "not json at all").unwrap();
        writeln!(file).unwrap();

        let fragments = read_jsonl(&path).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].id.project, "p");
    }
}
