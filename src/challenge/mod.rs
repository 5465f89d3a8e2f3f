// Wire codec and brute-force search for proof-of-work gate challenges.

pub mod codec;
pub mod solver;

pub use codec::{
    CHALLENGE_HEADER, PowChallenge, PowSolution, REASON_HEADER, SOLUTION_HEADER, decode_challenge,
    decode_solution, encode_challenge, encode_solution,
};
pub use solver::{
    DEFAULT_MAX_ITERATIONS, PowSolver, SolverError, has_leading_zero_bits, leading_zero_bits,
    sha256_hex, verify_solution,
};
