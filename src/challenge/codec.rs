//! Wire codec for gate challenges and their solutions.
//!
//! Challenges travel server-to-client as base64(JSON) in the
//! `X-PoW-Challenge` response header; solutions travel back in
//! `X-PoW-Solution` on the replayed request. Decoding is total: malformed
//! input yields `None`, never an error.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response header carrying the encoded challenge on a 423 response.
pub const CHALLENGE_HEADER: &str = "x-pow-challenge";
/// Optional response header with a human-readable reason for the lock.
pub const REASON_HEADER: &str = "x-pow-reason";
/// Request header carrying the encoded solution on the replay.
pub const SOLUTION_HEADER: &str = "x-pow-solution";

/// Server-issued puzzle. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowChallenge {
    /// Opaque server nonce the solution is bound to.
    pub nonce: String,
    /// Required leading zero bits, counted at bit granularity.
    pub difficulty: u32,
    /// Unix timestamp (seconds) at issue time.
    pub timestamp: i64,
    /// Seconds the server accepts solutions for after `timestamp`.
    pub ttl: u64,
}

impl PowChallenge {
    /// Whether the server would reject solutions at `now`. The solver never
    /// consults this; expiry is enforced server-side on verification.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.timestamp.saturating_add(self.ttl as i64)
    }
}

/// Counter satisfying a challenge's difficulty target. Bound to one nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowSolution {
    pub nonce: String,
    pub counter: u64,
}

/// Decode a base64(JSON) challenge header value.
pub fn decode_challenge(encoded: &str) -> Option<PowChallenge> {
    let raw = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Encode a challenge the way the server transports it.
pub fn encode_challenge(challenge: &PowChallenge) -> String {
    STANDARD.encode(serde_json::to_vec(challenge).unwrap_or_default())
}

/// Encode a solution for the `X-PoW-Solution` header.
pub fn encode_solution(solution: &PowSolution) -> String {
    STANDARD.encode(serde_json::to_vec(solution).unwrap_or_default())
}

/// Decode a solution header value, for verifiers and tests.
pub fn decode_solution(encoded: &str) -> Option<PowSolution> {
    let raw = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> PowChallenge {
        PowChallenge {
            nonce: "abc".into(),
            difficulty: 8,
            timestamp: 1_700_000_000,
            ttl: 60,
        }
    }

    #[test]
    fn challenge_round_trips() {
        let original = challenge();
        let decoded = decode_challenge(&encode_challenge(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn solution_round_trips() {
        let original = PowSolution {
            nonce: "abc".into(),
            counter: 4187,
        };
        let decoded = decode_solution(&encode_solution(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn malformed_input_decodes_to_none() {
        assert!(decode_challenge("not base64").is_none());
        assert!(decode_challenge("!!!").is_none());
        // Valid base64, but not challenge JSON.
        assert!(decode_challenge(&STANDARD.encode(b"{\"nope\":1}")).is_none());
        assert!(decode_solution("not base64").is_none());
    }

    #[test]
    fn expiry_is_timestamp_plus_ttl() {
        let challenge = challenge();
        let before = DateTime::from_timestamp(1_700_000_059, 0).unwrap();
        let after = DateTime::from_timestamp(1_700_000_060, 0).unwrap();
        assert!(!challenge.is_expired(before));
        assert!(challenge.is_expired(after));
    }
}
