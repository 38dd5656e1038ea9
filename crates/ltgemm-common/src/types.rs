//! Element types, compute precisions and operand layouts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a GEMM operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F32,
    F16,
    Bf16,
    /// 8-bit float, 4 exponent / 3 mantissa bits.
    F8e4m3,
    /// 8-bit float, 5 exponent / 2 mantissa bits.
    Bf8e5m2,
    I8,
    I32,
}

impl DataType {
    /// Storage size of one element in bytes.
    pub const fn size_bytes(self) -> u64 {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::Bf16 => 2,
            Self::F8e4m3 | Self::Bf8e5m2 | Self::I8 => 1,
        }
    }

    pub const ALL: &[DataType] = &[
        Self::F32,
        Self::F16,
        Self::Bf16,
        Self::F8e4m3,
        Self::Bf8e5m2,
        Self::I8,
        Self::I32,
    ];
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F16 => write!(f, "f16"),
            Self::Bf16 => write!(f, "bf16"),
            Self::F8e4m3 => write!(f, "f8e4m3"),
            Self::Bf8e5m2 => write!(f, "bf8e5m2"),
            Self::I8 => write!(f, "i8"),
            Self::I32 => write!(f, "i32"),
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" => Ok(Self::F32),
            "f16" => Ok(Self::F16),
            "bf16" => Ok(Self::Bf16),
            "f8e4m3" => Ok(Self::F8e4m3),
            "bf8e5m2" => Ok(Self::Bf8e5m2),
            "i8" => Ok(Self::I8),
            "i32" => Ok(Self::I32),
            other => Err(format!("unknown data type: {other}")),
        }
    }
}

/// Accumulation precision used inside the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeType {
    F32,
    /// f32 accumulation with f16 inputs to the matrix cores.
    F32FastF16,
    /// f32 accumulation with bf16 inputs to the matrix cores.
    F32FastBf16,
    /// f32 accumulation with xf32 inputs to the matrix cores.
    F32FastXf32,
    F64,
    I32,
}

impl ComputeType {
    /// Size of one accumulator element in bytes. Split-K partials are
    /// stored at this width.
    pub const fn accumulator_bytes(self) -> u64 {
        match self {
            Self::F64 => 8,
            _ => 4,
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F32FastF16 => write!(f, "f32_fast_f16"),
            Self::F32FastBf16 => write!(f, "f32_fast_bf16"),
            Self::F32FastXf32 => write!(f, "f32_fast_xf32"),
            Self::F64 => write!(f, "f64"),
            Self::I32 => write!(f, "i32"),
        }
    }
}

impl std::str::FromStr for ComputeType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f32" => Ok(Self::F32),
            "f32_fast_f16" => Ok(Self::F32FastF16),
            "f32_fast_bf16" => Ok(Self::F32FastBf16),
            "f32_fast_xf32" => Ok(Self::F32FastXf32),
            "f64" => Ok(Self::F64),
            "i32" => Ok(Self::I32),
            other => Err(format!("unknown compute type: {other}")),
        }
    }
}

/// Transpose flag for an input operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operation {
    /// Operand used as stored.
    #[default]
    N,
    /// Operand transposed before the multiply.
    T,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::N => write!(f, "N"),
            Self::T => write!(f, "T"),
        }
    }
}

/// Full type signature of a GEMM: `D = act(alpha * op(A) * op(B) + beta * C)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemmTypes {
    pub a: DataType,
    pub b: DataType,
    pub c: DataType,
    pub d: DataType,
    pub compute: ComputeType,
}

impl GemmTypes {
    pub const fn new(
        a: DataType,
        b: DataType,
        c: DataType,
        d: DataType,
        compute: ComputeType,
    ) -> Self {
        Self { a, b, c, d, compute }
    }

    /// Half-precision operands with f32 accumulation.
    pub const fn hhs() -> Self {
        Self::new(DataType::F16, DataType::F16, DataType::F16, DataType::F16, ComputeType::F32)
    }

    /// f8 (e4m3) A times f16 B, f32 output, f16 matrix-core inputs.
    pub const fn f8_mixed() -> Self {
        Self::new(
            DataType::F8e4m3,
            DataType::F16,
            DataType::F32,
            DataType::F32,
            ComputeType::F32FastF16,
        )
    }

    /// Single precision everywhere.
    pub const fn sss() -> Self {
        Self::new(DataType::F32, DataType::F32, DataType::F32, DataType::F32, ComputeType::F32)
    }
}

impl fmt::Display for GemmTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}->{}/{} ({})", self.a, self.b, self.c, self.d, self.compute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_display_roundtrip() {
        for &dt in DataType::ALL {
            let parsed: DataType = dt.to_string().parse().unwrap();
            assert_eq!(parsed, dt);
        }
    }

    #[test]
    fn data_type_sizes() {
        assert_eq!(DataType::F32.size_bytes(), 4);
        assert_eq!(DataType::F16.size_bytes(), 2);
        assert_eq!(DataType::F8e4m3.size_bytes(), 1);
    }

    #[test]
    fn unknown_data_type_is_rejected() {
        let err = "f12".parse::<DataType>().unwrap_err();
        assert!(err.contains("f12"));
    }

    #[test]
    fn compute_type_parse_is_case_insensitive() {
        assert_eq!("F32_FAST_F16".parse::<ComputeType>().unwrap(), ComputeType::F32FastF16);
        assert_eq!(ComputeType::F64.accumulator_bytes(), 8);
    }

    #[test]
    fn presets_match_sample_signatures() {
        let mixed = GemmTypes::f8_mixed();
        assert_eq!(mixed.a, DataType::F8e4m3);
        assert_eq!(mixed.d, DataType::F32);
        assert_eq!(GemmTypes::hhs().compute, ComputeType::F32);
    }
}
