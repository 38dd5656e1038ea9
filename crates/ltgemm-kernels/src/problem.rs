//! GEMM problem description.
//!
//! A [`GemmProblem`] is immutable once built. It names the shapes, layouts
//! and types of one request together with the caller's operand buffers and
//! host-resident coefficients.

use std::fmt;

use ltgemm_common::{
    ActivationType, DeviceBuffer, GemmError, GemmTypes, HostScalar, Operation, Result,
};

/// Fused post-processing applied after the multiply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Epilogue {
    pub activation: ActivationType,
    pub activation_args: Vec<f32>,
    /// Add a per-row bias vector before the activation.
    pub bias: bool,
}

impl Epilogue {
    /// Identity epilogue: no bias, no activation.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn with_activation(activation: ActivationType, args: &[f32]) -> Self {
        Self { activation, activation_args: args.to_vec(), bias: false }
    }

    #[must_use]
    pub fn with_bias(mut self) -> Self {
        self.bias = true;
        self
    }

    pub fn is_identity(&self) -> bool {
        self.activation == ActivationType::None && !self.bias
    }

    fn validate(&self) -> Result<()> {
        if !self.activation.is_requestable() {
            return Err(GemmError::InvalidProblem(format!(
                "activation '{}' cannot be requested in an epilogue",
                self.activation
            )));
        }
        let expected = self.activation.additional_arg_count();
        if self.activation_args.len() != expected {
            return Err(GemmError::InvalidProblem(format!(
                "activation '{}' takes {expected} arguments, got {}",
                self.activation,
                self.activation_args.len()
            )));
        }
        Ok(())
    }
}

/// Operand buffers and coefficients for one GEMM.
#[derive(Debug, Clone)]
pub struct GemmInputs {
    pub a: DeviceBuffer,
    pub b: DeviceBuffer,
    pub c: DeviceBuffer,
    pub d: DeviceBuffer,
    pub alpha: HostScalar,
    pub beta: HostScalar,
    pub bias: Option<DeviceBuffer>,
    /// Device-resident f32 scale applied to A.
    pub scale_a: Option<DeviceBuffer>,
    /// Device-resident f32 scale applied to B.
    pub scale_b: Option<DeviceBuffer>,
}

impl GemmInputs {
    pub fn new(
        a: DeviceBuffer,
        b: DeviceBuffer,
        c: DeviceBuffer,
        d: DeviceBuffer,
        alpha: HostScalar,
        beta: HostScalar,
    ) -> Self {
        Self { a, b, c, d, alpha, beta, bias: None, scale_a: None, scale_b: None }
    }

    #[must_use]
    pub fn with_bias(mut self, bias: DeviceBuffer) -> Self {
        self.bias = Some(bias);
        self
    }

    #[must_use]
    pub fn with_scale_a(mut self, scale: DeviceBuffer) -> Self {
        self.scale_a = Some(scale);
        self
    }

    #[must_use]
    pub fn with_scale_b(mut self, scale: DeviceBuffer) -> Self {
        self.scale_b = Some(scale);
        self
    }

    /// True when either auxiliary scale buffer is attached.
    pub fn has_scale_ab(&self) -> bool {
        self.scale_a.is_some() || self.scale_b.is_some()
    }
}

/// Operand slot, used for size and pointer checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
    C,
    D,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

/// One GEMM request: `D = act(alpha * op(A) * op(B) + beta * C [+ bias])`.
#[derive(Debug, Clone)]
pub struct GemmProblem {
    m: u64,
    n: u64,
    k: u64,
    batch_count: u64,
    trans_a: Operation,
    trans_b: Operation,
    types: GemmTypes,
    epilogue: Epilogue,
    inputs: GemmInputs,
}

impl GemmProblem {
    pub fn builder(m: u64, n: u64, k: u64) -> GemmProblemBuilder {
        GemmProblemBuilder {
            m,
            n,
            k,
            batch_count: 1,
            trans_a: Operation::N,
            trans_b: Operation::N,
            types: GemmTypes::hhs(),
            epilogue: Epilogue::identity(),
            inputs: None,
        }
    }

    pub fn m(&self) -> u64 {
        self.m
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn k(&self) -> u64 {
        self.k
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    pub fn trans_a(&self) -> Operation {
        self.trans_a
    }

    pub fn trans_b(&self) -> Operation {
        self.trans_b
    }

    pub fn types(&self) -> &GemmTypes {
        &self.types
    }

    pub fn epilogue(&self) -> &Epilogue {
        &self.epilogue
    }

    pub fn inputs(&self) -> &GemmInputs {
        &self.inputs
    }

    /// Leading dimension of A (column-major).
    pub fn lda(&self) -> u64 {
        match self.trans_a {
            Operation::N => self.m,
            Operation::T => self.k,
        }
    }

    /// Leading dimension of B (column-major).
    pub fn ldb(&self) -> u64 {
        match self.trans_b {
            Operation::N => self.k,
            Operation::T => self.n,
        }
    }

    /// Leading dimension of C and D.
    pub fn ldc(&self) -> u64 {
        self.m
    }

    /// Minimum byte size of an operand buffer, all batches packed.
    pub fn operand_bytes(&self, operand: Operand) -> u64 {
        let (rows, cols, dtype) = match operand {
            Operand::A => (self.m, self.k, self.types.a),
            Operand::B => (self.k, self.n, self.types.b),
            Operand::C => (self.m, self.n, self.types.c),
            Operand::D => (self.m, self.n, self.types.d),
        };
        rows.saturating_mul(cols)
            .saturating_mul(self.batch_count)
            .saturating_mul(dtype.size_bytes())
    }

    /// Minimum byte size of the bias vector.
    pub fn bias_bytes(&self) -> u64 {
        self.m.saturating_mul(self.types.d.size_bytes())
    }

    /// Total floating-point operations, counting a multiply-add as two.
    pub fn flops(&self) -> u64 {
        self.m
            .saturating_mul(self.n)
            .saturating_mul(self.k)
            .saturating_mul(self.batch_count)
            .saturating_mul(2)
    }
}

impl fmt::Display for GemmProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gemm m={} n={} k={} batch={} {}{} {}",
            self.m, self.n, self.k, self.batch_count, self.trans_a, self.trans_b, self.types
        )?;
        if !self.epilogue.is_identity() {
            write!(f, " act={}", self.epilogue.activation)?;
            if self.epilogue.bias {
                write!(f, "+bias")?;
            }
        }
        Ok(())
    }
}

/// Builder for [`GemmProblem`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct GemmProblemBuilder {
    m: u64,
    n: u64,
    k: u64,
    batch_count: u64,
    trans_a: Operation,
    trans_b: Operation,
    types: GemmTypes,
    epilogue: Epilogue,
    inputs: Option<GemmInputs>,
}

impl GemmProblemBuilder {
    #[must_use]
    pub fn batch_count(mut self, batch_count: u64) -> Self {
        self.batch_count = batch_count;
        self
    }

    #[must_use]
    pub fn transpose(mut self, trans_a: Operation, trans_b: Operation) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    #[must_use]
    pub fn types(mut self, types: GemmTypes) -> Self {
        self.types = types;
        self
    }

    #[must_use]
    pub fn epilogue(mut self, epilogue: Epilogue) -> Self {
        self.epilogue = epilogue;
        self
    }

    #[must_use]
    pub fn inputs(mut self, inputs: GemmInputs) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn build(self) -> Result<GemmProblem> {
        for (name, value) in [("m", self.m), ("n", self.n), ("k", self.k)] {
            if value == 0 {
                return Err(GemmError::InvalidProblem(format!("{name} must be > 0")));
            }
        }
        if self.batch_count == 0 {
            return Err(GemmError::InvalidProblem("batch_count must be >= 1".into()));
        }
        self.epilogue.validate()?;
        let inputs = self
            .inputs
            .ok_or_else(|| GemmError::InvalidProblem("operand inputs are not set".into()))?;

        Ok(GemmProblem {
            m: self.m,
            n: self.n,
            k: self.k,
            batch_count: self.batch_count,
            trans_a: self.trans_a,
            trans_b: self.trans_b,
            types: self.types,
            epilogue: self.epilogue,
            inputs,
        })
    }
}
