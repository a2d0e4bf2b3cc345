//! Prediction Oracle
//!
//! Opaque collaborator behind the "AI prediction" flow. The scores are
//! presentation theater, not verified computation: a hash of the input
//! dressed up as model output, and a proof check that only looks at
//! shape. Nothing here is load-bearing for correctness; the policy
//! engine re-validates every move against live state.

use serde::Serialize;

/// Proofs shorter than this are rejected outright.
pub const MIN_PROOF_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    InvalidProofLength(usize),
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidProofLength(n) => {
                write!(f, "invalid proof length: {} (minimum {})", n, MIN_PROOF_LEN)
            }
        }
    }
}

impl std::error::Error for OracleError {}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Prediction {
    /// Yield score in basis points, comparable to the trigger threshold.
    pub score: u64,
    pub confidence: f64,
}

/// Swappable prediction source. Best-effort only: consumers may act on a
/// high score but must never depend on it for safety.
pub trait PredictionOracle: Send + Sync {
    fn verify(&self, proof: &[u8], input: &[u8], output: &[u8]) -> Result<(), OracleError>;
    fn predict(&self, input: &[u8]) -> Prediction;
}

/// Deterministic demo oracle: FNV-style folding of the input stands in
/// for model inference.
pub struct DemoOracle {
    model_id: String,
}

impl DemoOracle {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn fold(&self, input: &[u8]) -> u64 {
        let mut h = 0xcbf2_9ce4_8422_2325u64;
        for &b in self.model_id.as_bytes().iter().chain(input.iter()) {
            h ^= b as u64;
            h = h.wrapping_mul(0x1000_0000_01b3);
        }
        h
    }
}

impl PredictionOracle for DemoOracle {
    fn verify(&self, proof: &[u8], _input: &[u8], _output: &[u8]) -> Result<(), OracleError> {
        if proof.len() < MIN_PROOF_LEN {
            return Err(OracleError::InvalidProofLength(proof.len()));
        }
        Ok(())
    }

    fn predict(&self, input: &[u8]) -> Prediction {
        let h = self.fold(input);
        Prediction {
            score: h % 1000,
            confidence: 0.5 + (h >> 32) as f64 / u32::MAX as f64 / 2.0,
        }
    }
}
