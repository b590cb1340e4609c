//! Encryption oracle seam
//!
//! The probe engine is written against this trait so the same analysis
//! drives both the sandboxed Python harness and the hermetic reference
//! oracle the test suite uses.

use sha2::{Digest, Sha256};

/// Failure surfaced by an oracle invocation.
///
/// Carried as data rather than an error enum because the probe must fold it
/// into attempt evidence (timeout tag, failure note), never propagate it.
#[derive(Debug, Clone)]
pub struct OracleFailure {
    pub message: String,
    pub timed_out: bool,
}

impl OracleFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }
}

/// Anything that can encrypt attacker-chosen plaintext
pub trait EncryptionOracle {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, OracleFailure>;
}

/// Deterministic block-wise reference oracle.
///
/// Implements ECB structure over a keyed pseudo-cipher: each 16-byte block
/// maps to the first 16 bytes of SHA-256(key || block). The chained variant
/// additionally mixes the previous ciphertext block into the hash input,
/// which destroys block repetition the way CBC does. The construction is not
/// a real cipher; it exists so probe behavior can be tested without a Python
/// interpreter, and its leak/no-leak structure matches ECB/CBC exactly.
pub struct ReferenceOracle {
    key: Vec<u8>,
    chained: bool,
}

impl ReferenceOracle {
    const BLOCK: usize = 16;

    /// ECB structure: blocks encrypted independently
    pub fn ecb(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            chained: false,
        }
    }

    /// CBC-like structure: each block depends on the previous ciphertext
    pub fn chained(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            chained: true,
        }
    }

    fn encrypt_block(&self, block: &[u8], previous: &[u8]) -> [u8; 16] {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        if self.chained {
            hasher.update(previous);
        }
        hasher.update(block);
        let digest = hasher.finalize();
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        out
    }
}

impl EncryptionOracle for ReferenceOracle {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, OracleFailure> {
        let mut ciphertext = Vec::with_capacity(plaintext.len() + Self::BLOCK);
        let mut previous = [0u8; 16];

        for chunk in plaintext.chunks(Self::BLOCK) {
            // Zero-pad the final partial block
            let mut block = [0u8; 16];
            block[..chunk.len()].copy_from_slice(chunk);
            let encrypted = self.encrypt_block(&block, &previous);
            ciphertext.extend_from_slice(&encrypted);
            previous = encrypted;
        }
        Ok(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecb_structure_repeats() {
        let mut oracle = ReferenceOracle::ecb(b"k".to_vec());
        let ct = oracle.encrypt(&[0x41; 32]).unwrap();
        assert_eq!(&ct[..16], &ct[16..32]);
    }

    #[test]
    fn test_chained_structure_diffuses() {
        let mut oracle = ReferenceOracle::chained(b"k".to_vec());
        let ct = oracle.encrypt(&[0x41; 32]).unwrap();
        assert_ne!(&ct[..16], &ct[16..32]);
    }

    #[test]
    fn test_deterministic_per_key() {
        let a = ReferenceOracle::ecb(b"key-1".to_vec()).encrypt(&[7; 16]).unwrap();
        let b = ReferenceOracle::ecb(b"key-1".to_vec()).encrypt(&[7; 16]).unwrap();
        let c = ReferenceOracle::ecb(b"key-2".to_vec()).encrypt(&[7; 16]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
