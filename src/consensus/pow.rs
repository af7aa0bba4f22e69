// src/consensus/pow.rs
//
// Minimal Proof-of-Work: header.difficulty_bits is the number of leading
// zero bits required of SHA-256(header bytes). Headers are immutable, so
// mining rebuilds the header for every nonce; the timestamp is frozen at
// template build time.

use num_bigint::BigUint;

use crate::types::{Block, BlockHeader, Hash};

/// Clamp difficulty to [0, 256]; SHA-256 cannot have more than 256 zero bits.
fn required_bits(difficulty_bits: i64) -> u32 {
    difficulty_bits.clamp(0, 256) as u32
}

/// Fast path: whole zero bytes first, then the leading bits of the next byte.
fn has_leading_zero_bits(hash: &Hash, required: u32) -> bool {
    if required == 0 {
        return true;
    }
    let full_bytes = (required / 8) as usize;
    let rem_bits = required % 8;
    if hash[..full_bytes].iter().any(|&b| b != 0) {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }
    hash[full_bytes].leading_zeros() >= rem_bits
}

pub fn meets_target(header: &BlockHeader) -> bool {
    has_leading_zero_bits(&header.hash(), required_bits(header.difficulty_bits))
}

/// Iterate the nonce from the template's starting value for up to `max_tries`
/// steps. Returns the first block whose header meets the target.
pub fn mine(template: &Block, max_tries: u64) -> Option<Block> {
    let required = required_bits(template.header.difficulty_bits);
    let start = template.header.nonce;
    for i in 0..max_tries {
        let mut candidate = template.header.clone();
        candidate.nonce = start.wrapping_add(i);
        if has_leading_zero_bits(&candidate.hash(), required) {
            return Some(Block {
                header: candidate,
                transactions: template.transactions.clone(),
            });
        }
    }
    None
}

/// Work metric for a single header: 1 for difficulty <= 0, else 2^bits.
pub fn block_work(header: &BlockHeader) -> BigUint {
    let bits = required_bits(header.difficulty_bits);
    if bits == 0 {
        return BigUint::from(1u8);
    }
    BigUint::from(1u8) << bits
}
