//! Common types for the ltgemm selection engine.
//!
//! This crate holds what both the catalog and the binding layer need:
//! element/compute types, epilogue activations, caller-owned memory
//! handles, the error taxonomy, and the configuration file.

pub mod activation;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use activation::ActivationType;
pub use config::{ConfigError, GemmConfig, StrategyKind};
pub use error::{GemmError, Result};
pub use memory::{DeviceBuffer, DevicePtr, HostScalar};
pub use types::{ComputeType, DataType, GemmTypes, Operation};
