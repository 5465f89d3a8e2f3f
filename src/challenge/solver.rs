//! Brute-force search for proof-of-work counters.
//!
//! The server accepts a counter when the SHA-256 digest of
//! `"{nonce}:{counter}"` has at least `difficulty` leading zero bits. The
//! search yields to the executor periodically so long runs do not starve
//! concurrent tasks, and fails hard once an iteration ceiling is exhausted
//! (the practical signal for a misconfigured difficulty).

use std::fmt::Write;

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::codec::{PowChallenge, PowSolution};

/// Iterations between cooperative yields back to the executor.
const YIELD_INTERVAL: u64 = 1_000;

/// Default iteration ceiling before a search is declared unsolvable.
pub const DEFAULT_MAX_ITERATIONS: u64 = 100_000_000;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error(
        "challenge took too long to solve: gave up after {iterations} iterations at difficulty {difficulty}"
    )]
    TookTooLong { difficulty: u32, iterations: u64 },
}

/// Counter search over a server-issued challenge.
#[derive(Debug, Clone)]
pub struct PowSolver {
    max_iterations: u64,
}

impl PowSolver {
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Bound the search. Mostly useful to keep a bad server from pinning the
    /// client; the default ceiling already exceeds any sane difficulty.
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Search counters from zero until the digest meets the difficulty
    /// target. Expiry of the challenge is not checked here; the server
    /// enforces it on verification.
    pub async fn solve(&self, challenge: &PowChallenge) -> Result<PowSolution, SolverError> {
        let mut counter: u64 = 0;
        loop {
            let digest = sha256_hex(&format!("{}:{}", challenge.nonce, counter));
            if has_leading_zero_bits(&digest, challenge.difficulty) {
                return Ok(PowSolution {
                    nonce: challenge.nonce.clone(),
                    counter,
                });
            }
            counter += 1;
            if counter % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
            if counter > self.max_iterations {
                return Err(SolverError::TookTooLong {
                    difficulty: challenge.difficulty,
                    iterations: self.max_iterations,
                });
            }
        }
    }
}

impl Default for PowSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex SHA-256 digest of the UTF-8 bytes of `input`.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    })
}

/// Bit-exact leading-zero check on a hex digest: the first `bits / 4` chars
/// must be `'0'` and, when `bits % 4 != 0`, the next char's value must stay
/// below `2^(4 - bits % 4)`.
pub fn has_leading_zero_bits(hex_digest: &str, bits: u32) -> bool {
    let full_chars = (bits / 4) as usize;
    let remaining = bits % 4;
    let chars = hex_digest.as_bytes();

    if chars.len() < full_chars {
        return false;
    }
    if chars[..full_chars].iter().any(|&c| c != b'0') {
        return false;
    }
    if remaining > 0 {
        let Some(&next) = chars.get(full_chars) else {
            return false;
        };
        let Some(value) = (next as char).to_digit(16) else {
            return false;
        };
        if value > (1 << (4 - remaining)) - 1 {
            return false;
        }
    }
    true
}

/// Count leading zero bits of a raw digest. Independent of the hex-level
/// check so verification does not share code with the search.
pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut count = 0;
    for &byte in digest {
        if byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Verify a solution against its challenge without trusting the solver.
pub fn verify_solution(challenge: &PowChallenge, solution: &PowSolution) -> bool {
    if solution.nonce != challenge.nonce {
        return false;
    }
    let digest = Sha256::digest(format!("{}:{}", solution.nonce, solution.counter).as_bytes());
    leading_zero_bits(&digest) >= challenge.difficulty
}
