//! GEMM algorithm selection and execution binding.
//!
//! The flow for one request is: describe it with a [`GemmProblem`], pick an
//! algorithm with a [`Selector`] under a workspace budget, bind it with
//! [`ExecutionPlan::initialize`], then enqueue it with
//! [`ExecutionPlan::run`]. The catalog and checker are explicit service
//! objects; [`builtin_catalog`] is only a convenient default.

pub mod builtin;
pub mod catalog;
pub mod dispatch;
pub mod plan;
pub mod problem;
pub mod selector;
pub mod support;

pub use builtin::builtin_catalog;
pub use catalog::{
    AlgorithmCatalog, AlgorithmHandle, Alignment, CatalogBuilder, GemmPreference, KernelCatalog,
    KernelGeometry, KernelVariant, MacroTile,
};
pub use dispatch::{
    DeviceStream, GemmKernelArgs, HostStream, KernelLaunch, LaunchConfig, LaunchTicket,
};
pub use plan::{Coefficients, ExecutionPlan, PlanState};
pub use problem::{Epilogue, GemmInputs, GemmProblem, GemmProblemBuilder, Operand};
pub use selector::{Selection, Selector, SelectorConfig, Strategy};
pub use support::{Rejection, SupportChecker, SupportResult};

pub use ltgemm_common::{
    ActivationType, ComputeType, DataType, DeviceBuffer, DevicePtr, GemmConfig, GemmError,
    GemmTypes, HostScalar, Operation, Result,
};
