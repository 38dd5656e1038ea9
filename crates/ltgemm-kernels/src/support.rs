//! Support checks: can a given algorithm run a given problem, and with how
//! much scratch memory.

use std::fmt;

use ltgemm_common::{GemmTypes, Operation};

use crate::catalog::{AlgorithmHandle, KernelGeometry};
use crate::problem::GemmProblem;

/// Why an algorithm refused a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TypeMismatch { expected: GemmTypes, found: GemmTypes },
    LayoutMismatch { expected: (Operation, Operation), found: (Operation, Operation) },
    Alignment { dim: char, value: u64, multiple: u64 },
    BatchingUnsupported { batch_count: u64 },
    EpilogueUnsupported(String),
    /// Split-K needs at least one unrolled K loop per split.
    SplitTooDeep { k: u64, needed: u64 },
    UnknownAlgorithm { index: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "types {found} do not match kernel types {expected}")
            }
            Self::LayoutMismatch { expected, found } => write!(
                f,
                "layout {}{} does not match kernel layout {}{}",
                found.0, found.1, expected.0, expected.1
            ),
            Self::Alignment { dim, value, multiple } => {
                write!(f, "{dim}={value} is not a multiple of {multiple}")
            }
            Self::BatchingUnsupported { batch_count } => {
                write!(f, "batch_count={batch_count} but kernel is not batched")
            }
            Self::EpilogueUnsupported(what) => write!(f, "epilogue: {what}"),
            Self::SplitTooDeep { k, needed } => {
                write!(f, "k={k} too small for split-K (needs {needed})")
            }
            Self::UnknownAlgorithm { index } => write!(f, "no algorithm at index {index}"),
        }
    }
}

/// Outcome of one support check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportResult {
    pub supported: bool,
    /// Exact scratch bytes needed; zero when unsupported.
    pub required_workspace_bytes: u64,
    pub rejection: Option<Rejection>,
}

impl SupportResult {
    pub fn supported(required_workspace_bytes: u64) -> Self {
        Self { supported: true, required_workspace_bytes, rejection: None }
    }

    pub fn unsupported(rejection: Rejection) -> Self {
        Self { supported: false, required_workspace_bytes: 0, rejection: Some(rejection) }
    }

    /// Supported and within `budget` bytes of workspace.
    pub fn fits(&self, budget: u64) -> bool {
        self.supported && self.required_workspace_bytes <= budget
    }
}

/// Compatibility oracle for (algorithm, problem) pairs.
///
/// `check` must be pure: the same inputs give the same answer regardless
/// of call order or thread, which lets the selector evaluate candidates in
/// parallel.
pub trait SupportChecker: Send + Sync {
    fn check(&self, handle: &AlgorithmHandle, problem: &GemmProblem) -> SupportResult;

    /// Launch shape for `handle`.
    fn geometry(&self, _handle: &AlgorithmHandle) -> KernelGeometry {
        KernelGeometry::default()
    }
}
