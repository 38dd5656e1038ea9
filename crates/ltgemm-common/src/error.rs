//! Error taxonomy for selection, binding and dispatch.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced while selecting, binding or dispatching a GEMM.
#[derive(Debug, Error)]
pub enum GemmError {
    /// No algorithm in the searched space satisfies the problem and budget.
    #[error("no algorithm found for {problem} ({checked} candidates checked)")]
    NotFound { problem: String, checked: usize },

    /// A specific algorithm rejects the problem on type or shape grounds.
    #[error("algorithm {index} does not support the problem: {reason}")]
    Unsupported { index: usize, reason: String },

    /// A compatible algorithm needs more workspace than the caller offers.
    #[error("algorithm {index} needs {required} workspace bytes, budget is {budget}")]
    BudgetExceeded { index: usize, required: u64, budget: u64 },

    /// Buffer or type mismatch found while binding an algorithm.
    #[error("initialization failed for algorithm {index}: {reason}")]
    Initialization { index: usize, reason: String },

    /// A plan could not be enqueued.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, GemmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_reports_how_many_were_checked() {
        let err = GemmError::NotFound { problem: "gemm 8x8x8".into(), checked: 300 };
        let msg = err.to_string();
        assert!(msg.contains("gemm 8x8x8"), "{msg}");
        assert!(msg.contains("300 candidates"), "{msg}");
    }

    #[test]
    fn budget_message_names_both_sizes() {
        let err = GemmError::BudgetExceeded { index: 7, required: 33, budget: 32 };
        let msg = err.to_string();
        assert!(msg.contains("33"), "{msg}");
        assert!(msg.contains("32"), "{msg}");
    }
}
