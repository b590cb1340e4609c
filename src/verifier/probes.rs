//! Block-repetition probe primitives
//!
//! ECB encrypts each block independently, so identical plaintext blocks
//! produce identical ciphertext blocks. The probe feeds a run of identical
//! blocks through an encryption routine and looks for that collision in the
//! output. The run is longer than strictly necessary so that a prepended
//! header or nonce cannot hide the repetition by shifting block alignment.

use crate::models::RepeatedBlockPair;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Identical blocks fed to the oracle; one extra distinct block guards
/// against degenerate constant-output routines
pub const REPEATED_BLOCKS: usize = 4;

/// Build the probe plaintext: REPEATED_BLOCKS copies of one block followed
/// by a single distinct block.
pub fn probe_plaintext(block_size: usize) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity((REPEATED_BLOCKS + 1) * block_size);
    for _ in 0..REPEATED_BLOCKS {
        plaintext.extend(std::iter::repeat(0x41).take(block_size));
    }
    plaintext.extend(std::iter::repeat(0x42).take(block_size));
    plaintext
}

/// What the probe saw in a ciphertext
#[derive(Debug, Clone, Default)]
pub struct ProbeAnalysis {
    /// Block index pairs with identical content
    pub repeated: Vec<RepeatedBlockPair>,
    /// Every full block in the ciphertext was identical
    pub uniform: bool,
    /// Number of full blocks inspected
    pub blocks: usize,
}

impl ProbeAnalysis {
    /// Repetition was observed and the output is not degenerate
    pub fn leaks(&self) -> bool {
        !self.repeated.is_empty() && !self.uniform && self.blocks >= 2
    }
}

/// Compare every pair of full ciphertext blocks.
///
/// Trailing partial blocks are ignored; a stream-cipher-like output with no
/// block structure simply produces no pairs.
pub fn analyze_blocks(ciphertext: &[u8], block_size: usize) -> ProbeAnalysis {
    let blocks: Vec<&[u8]> = ciphertext.chunks_exact(block_size).collect();
    let mut repeated = Vec::new();

    for i in 0..blocks.len() {
        for j in (i + 1)..blocks.len() {
            if blocks[i] == blocks[j] {
                repeated.push(RepeatedBlockPair { left: i, right: j });
            }
        }
    }

    let total_pairs = blocks.len().saturating_sub(1) * blocks.len() / 2;
    ProbeAnalysis {
        uniform: blocks.len() >= 2 && repeated.len() == total_pairs,
        blocks: blocks.len(),
        repeated,
    }
}
