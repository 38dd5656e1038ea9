//! Activation functions that can be fused into a GEMM epilogue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Activation applied to the GEMM output before it is written to `D`.
///
/// `All` is only meaningful as a kernel capability ("this kernel can apply
/// any activation"). `Exp` exists for verification kernels and is never a
/// valid request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationType {
    #[default]
    None,
    Abs,
    Clippedrelu,
    Gelu,
    Leakyrelu,
    Relu,
    Sigmoid,
    Tanh,
    /// Gelu derivative.
    DGelu,
    Geluscaling,
    All,
    Exp,
}

impl ActivationType {
    /// Number of extra scalar arguments the activation consumes.
    pub const fn additional_arg_count(self) -> usize {
        match self {
            Self::Clippedrelu | Self::All => 2,
            Self::Leakyrelu | Self::Geluscaling => 1,
            _ => 0,
        }
    }

    /// Whether a problem may request this activation.
    pub const fn is_requestable(self) -> bool {
        !matches!(self, Self::All | Self::Exp)
    }

    /// Whether a kernel advertising `self` can apply `requested`.
    pub fn accepts(self, requested: ActivationType) -> bool {
        match self {
            Self::All => requested != Self::Exp,
            cap => cap == requested || requested == Self::None,
        }
    }

    pub const ALL: &[ActivationType] = &[
        Self::None,
        Self::Abs,
        Self::Clippedrelu,
        Self::Gelu,
        Self::Leakyrelu,
        Self::Relu,
        Self::Sigmoid,
        Self::Tanh,
        Self::DGelu,
        Self::Geluscaling,
        Self::All,
        Self::Exp,
    ];
}

impl fmt::Display for ActivationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Abs => "abs",
            Self::Clippedrelu => "clippedrelu",
            Self::Gelu => "gelu",
            Self::Leakyrelu => "leakyrelu",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::DGelu => "dgelu",
            Self::Geluscaling => "geluscaling",
            Self::All => "all",
            Self::Exp => "exp",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ActivationType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "abs" => Ok(Self::Abs),
            "clippedrelu" => Ok(Self::Clippedrelu),
            "gelu" => Ok(Self::Gelu),
            "leakyrelu" => Ok(Self::Leakyrelu),
            "relu" => Ok(Self::Relu),
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            "dgelu" => Ok(Self::DGelu),
            "geluscaling" => Ok(Self::Geluscaling),
            "all" => Ok(Self::All),
            "exp" => Ok(Self::Exp),
            other => Err(format!("unknown activation type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrip() {
        for &act in ActivationType::ALL {
            let parsed: ActivationType = act.to_string().parse().unwrap();
            assert_eq!(parsed, act);
        }
    }

    #[test]
    fn additional_args() {
        assert_eq!(ActivationType::Clippedrelu.additional_arg_count(), 2);
        assert_eq!(ActivationType::Leakyrelu.additional_arg_count(), 1);
        assert_eq!(ActivationType::Geluscaling.additional_arg_count(), 1);
        assert_eq!(ActivationType::Relu.additional_arg_count(), 0);
        assert_eq!(ActivationType::None.additional_arg_count(), 0);
    }

    #[test]
    fn all_capability_accepts_everything_but_exp() {
        assert!(ActivationType::All.accepts(ActivationType::Gelu));
        assert!(ActivationType::All.accepts(ActivationType::None));
        assert!(!ActivationType::All.accepts(ActivationType::Exp));
    }

    #[test]
    fn single_capability_accepts_itself_and_identity() {
        assert!(ActivationType::Relu.accepts(ActivationType::Relu));
        assert!(ActivationType::Relu.accepts(ActivationType::None));
        assert!(!ActivationType::Relu.accepts(ActivationType::Gelu));
        assert!(!ActivationType::None.accepts(ActivationType::Relu));
    }

    #[test]
    fn verification_only_variants_are_not_requestable() {
        assert!(!ActivationType::Exp.is_requestable());
        assert!(!ActivationType::All.is_requestable());
        assert!(ActivationType::Tanh.is_requestable());
    }
}
