//! Execution plans: a problem bound to one algorithm and its buffers.

use tracing::debug;

use ltgemm_common::{DeviceBuffer, GemmError, Result};

use crate::catalog::{AlgorithmHandle, KernelGeometry};
use crate::problem::{GemmProblem, Operand};
use crate::support::SupportChecker;

/// Bytes of one scale-A / scale-B value.
const SCALE_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Uninitialized,
    Initialized,
}

/// alpha/beta as read at bind time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub alpha: f32,
    pub beta: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) handle: AlgorithmHandle,
    pub(crate) workspace: DeviceBuffer,
    pub(crate) coefficients: Coefficients,
    pub(crate) geometry: KernelGeometry,
}

/// A problem plus, once initialized, the algorithm it will run with.
///
/// `initialize` must be called again whenever the algorithm changes. The
/// plan never allocates device memory; operand and workspace buffers stay
/// owned by the caller.
pub struct ExecutionPlan<'a> {
    problem: GemmProblem,
    checker: &'a dyn SupportChecker,
    binding: Option<Binding>,
}

impl<'a> ExecutionPlan<'a> {
    pub fn new(problem: GemmProblem, checker: &'a dyn SupportChecker) -> Self {
        Self { problem, checker, binding: None }
    }

    pub fn problem(&self) -> &GemmProblem {
        &self.problem
    }

    pub fn state(&self) -> PlanState {
        if self.binding.is_some() { PlanState::Initialized } else { PlanState::Uninitialized }
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }

    pub fn bound_handle(&self) -> Option<&AlgorithmHandle> {
        self.binding.as_ref().map(|b| &b.handle)
    }

    /// Coefficients captured by the last successful `initialize`.
    pub fn coefficients(&self) -> Option<Coefficients> {
        self.binding.as_ref().map(|b| b.coefficients)
    }

    pub(crate) fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// Bind `handle` with `workspace` as scratch memory.
    ///
    /// Any previous binding is dropped first, so a failure leaves the plan
    /// uninitialized. alpha and beta are read now and not again until the
    /// next `initialize`.
    pub fn initialize(&mut self, handle: &AlgorithmHandle, workspace: DeviceBuffer) -> Result<()> {
        if let Some(previous) = self.binding.take() {
            if previous.handle != *handle {
                debug!(from = previous.handle.index(), to = handle.index(), "rebinding plan");
            }
        }
        let index = handle.index();
        let fail = |reason: String| GemmError::Initialization { index, reason };

        let support = self.checker.check(handle, &self.problem);
        if !support.supported {
            let reason = support
                .rejection
                .map(|r| r.to_string())
                .unwrap_or_else(|| "algorithm does not support the problem".into());
            return Err(fail(reason));
        }

        self.validate_operands().map_err(fail)?;

        let required = support.required_workspace_bytes;
        if required > 0 {
            if workspace.is_null() {
                return Err(fail(format!("workspace is null, {required} bytes required")));
            }
            if !workspace.holds(required) {
                return Err(fail(format!(
                    "workspace holds {} bytes, {required} required",
                    workspace.len_bytes
                )));
            }
        }

        let inputs = self.problem.inputs();
        let coefficients = Coefficients { alpha: inputs.alpha.get(), beta: inputs.beta.get() };
        let geometry = self.checker.geometry(handle);
        debug!(
            index,
            name = handle.name(),
            workspace = required,
            alpha = coefficients.alpha,
            beta = coefficients.beta,
            "plan initialized"
        );
        self.binding =
            Some(Binding { handle: handle.clone(), workspace, coefficients, geometry });
        Ok(())
    }

    fn validate_operands(&self) -> std::result::Result<(), String> {
        let p = &self.problem;
        let inputs = p.inputs();
        for (operand, buffer) in [
            (Operand::A, inputs.a),
            (Operand::B, inputs.b),
            (Operand::C, inputs.c),
            (Operand::D, inputs.d),
        ] {
            check_buffer(&operand.to_string(), buffer, p.operand_bytes(operand))?;
        }
        if p.epilogue().bias {
            let bias =
                inputs.bias.ok_or_else(|| "epilogue requests bias but none given".to_string())?;
            check_buffer("bias", bias, p.bias_bytes())?;
        }
        if let Some(scale) = inputs.scale_a {
            check_buffer("scale_a", scale, SCALE_BYTES)?;
        }
        if let Some(scale) = inputs.scale_b {
            check_buffer("scale_b", scale, SCALE_BYTES)?;
        }
        Ok(())
    }
}

fn check_buffer(name: &str, buffer: DeviceBuffer, needed: u64) -> std::result::Result<(), String> {
    if buffer.is_null() {
        return Err(format!("operand {name} pointer is null"));
    }
    if !buffer.holds(needed) {
        return Err(format!(
            "operand {name} holds {} bytes, {needed} required",
            buffer.len_bytes
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{KernelCatalog, KernelVariant, MacroTile};
    use crate::problem::{Epilogue, GemmInputs};
    use ltgemm_common::{ActivationType, DevicePtr, GemmTypes, HostScalar};

    const MIB: u64 = 1024 * 1024;

    fn buf(addr: u64) -> DeviceBuffer {
        DeviceBuffer::new(DevicePtr(addr), 16 * MIB)
    }

    fn inputs() -> GemmInputs {
        GemmInputs::new(
            buf(0x1000),
            buf(0x2000),
            buf(0x3000),
            buf(0x4000),
            HostScalar::new(1.0),
            HostScalar::new(0.0),
        )
    }

    fn catalog() -> KernelCatalog {
        let tile = MacroTile { m: 64, n: 64 };
        KernelCatalog::from_variants([
            KernelVariant::new("plain", GemmTypes::hhs(), tile)
                .with_activation(ActivationType::All)
                .with_bias(true),
            KernelVariant::new("split", GemmTypes::hhs(), tile).with_global_split_u(4),
            KernelVariant::new("f32", GemmTypes::sss(), tile),
        ])
        .unwrap()
    }

    fn problem(inputs: GemmInputs) -> GemmProblem {
        GemmProblem::builder(256, 256, 256).inputs(inputs).build().unwrap()
    }

    #[test]
    fn new_plan_is_uninitialized() {
        let cat = catalog();
        let plan = ExecutionPlan::new(problem(inputs()), &cat);
        assert_eq!(plan.state(), PlanState::Uninitialized);
        assert!(plan.bound_handle().is_none());
        assert!(plan.coefficients().is_none());
    }

    #[test]
    fn type_mismatch_fails_and_stays_uninitialized() {
        let cat = catalog();
        let mut plan = ExecutionPlan::new(problem(inputs()), &cat);
        plan.initialize(&cat.handles()[0], DeviceBuffer::null()).unwrap();
        let err = plan.initialize(&cat.handles()[2], DeviceBuffer::null()).unwrap_err();
        assert!(matches!(err, GemmError::Initialization { index: 2, .. }), "{err}");
        assert_eq!(plan.state(), PlanState::Uninitialized);
        assert!(plan.bound_handle().is_none());
    }

    #[test]
    fn workspace_must_cover_requirement() {
        let cat = catalog();
        let mut plan = ExecutionPlan::new(problem(inputs()), &cat);
        let split = &cat.handles()[1];
        // 256*256*4*4 = 1 MiB
        let err = plan.initialize(split, DeviceBuffer::null()).unwrap_err();
        assert!(err.to_string().contains("workspace is null"), "{err}");
        let short = DeviceBuffer::new(DevicePtr(0x9000), MIB - 1);
        assert!(plan.initialize(split, short).is_err());
        plan.initialize(split, DeviceBuffer::new(DevicePtr(0x9000), MIB)).unwrap();
        assert!(plan.is_initialized());
    }

    #[test]
    fn null_operand_is_rejected() {
        let cat = catalog();
        let mut i = inputs();
        i.b = DeviceBuffer::null();
        let mut plan = ExecutionPlan::new(problem(i), &cat);
        let err = plan.initialize(&cat.handles()[0], DeviceBuffer::null()).unwrap_err();
        assert!(err.to_string().contains("operand B pointer is null"), "{err}");
    }

    #[test]
    fn undersized_operand_is_rejected() {
        let cat = catalog();
        let mut i = inputs();
        // D needs 256*256*2 bytes
        i.d = DeviceBuffer::new(DevicePtr(0x4000), 256 * 256 * 2 - 1);
        let mut plan = ExecutionPlan::new(problem(i), &cat);
        assert!(plan.initialize(&cat.handles()[0], DeviceBuffer::null()).is_err());
    }

    #[test]
    fn bias_epilogue_needs_bias_buffer() {
        let cat = catalog();
        let p = GemmProblem::builder(256, 256, 256)
            .epilogue(Epilogue::with_activation(ActivationType::Relu, &[]).with_bias())
            .inputs(inputs())
            .build()
            .unwrap();
        let mut plan = ExecutionPlan::new(p.clone(), &cat);
        let err = plan.initialize(&cat.handles()[0], DeviceBuffer::null()).unwrap_err();
        assert!(err.to_string().contains("bias"), "{err}");

        let with_bias = GemmProblem::builder(256, 256, 256)
            .epilogue(p.epilogue().clone())
            .inputs(inputs().with_bias(buf(0x5000)))
            .build()
            .unwrap();
        let mut plan = ExecutionPlan::new(with_bias, &cat);
        plan.initialize(&cat.handles()[0], DeviceBuffer::null()).unwrap();
    }

    #[test]
    fn coefficients_are_snapshotted_at_initialize() {
        let cat = catalog();
        let alpha = HostScalar::new(2.0);
        let mut i = inputs();
        i.alpha = alpha.clone();
        let mut plan = ExecutionPlan::new(problem(i), &cat);
        let handle = cat.handles()[0].clone();
        plan.initialize(&handle, DeviceBuffer::null()).unwrap();

        alpha.set(5.0);
        assert_eq!(plan.coefficients().unwrap().alpha, 2.0);

        plan.initialize(&handle, DeviceBuffer::null()).unwrap();
        assert_eq!(plan.coefficients().unwrap().alpha, 5.0);
    }
}
