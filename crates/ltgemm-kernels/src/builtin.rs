//! Default kernel library covering the common type presets.

use std::sync::OnceLock;

use ltgemm_common::{ActivationType, DataType, GemmTypes, Operation};

use crate::catalog::{Alignment, KernelCatalog, KernelVariant, MacroTile};

const TYPE_PRESETS: [(&str, GemmTypes); 3] =
    [("hhs", GemmTypes::hhs()), ("f8h_s", GemmTypes::f8_mixed()), ("sss", GemmTypes::sss())];

const LAYOUTS: [(Operation, Operation); 4] = [
    (Operation::N, Operation::N),
    (Operation::N, Operation::T),
    (Operation::T, Operation::N),
    (Operation::T, Operation::T),
];

const TILES: [(u32, u32); 6] = [(256, 256), (256, 128), (128, 128), (128, 64), (64, 64), (32, 32)];

const SPLITS: [u32; 4] = [1, 2, 4, 8];

/// Process-wide builtin catalog, built on first use.
pub fn builtin_catalog() -> &'static KernelCatalog {
    static CATALOG: OnceLock<KernelCatalog> = OnceLock::new();
    CATALOG.get_or_init(|| KernelCatalog::from_registered(builtin_variants()))
}

/// Variants of the builtin catalog in index order.
pub fn builtin_variants() -> Vec<KernelVariant> {
    let mut variants =
        Vec::with_capacity(TYPE_PRESETS.len() * LAYOUTS.len() * TILES.len() * SPLITS.len());
    for (tag, types) in TYPE_PRESETS {
        let depth_u = if types.a == DataType::F8e4m3 { 64 } else { 32 };
        let alignment = Alignment { m: 1, n: 1, k: 16 / types.a.size_bytes() };
        for (trans_a, trans_b) in LAYOUTS {
            for (mt_m, mt_n) in TILES {
                let workgroup = match mt_m * mt_n {
                    area if area >= 128 * 128 => 256,
                    area if area >= 64 * 64 => 128,
                    _ => 64,
                };
                for gsu in SPLITS {
                    let name = format!(
                        "ltgemm_{tag}_{trans_a}{trans_b}_MT{mt_m}x{mt_n}x{depth_u}_GSU{gsu}"
                    );
                    // Split-K partials are reduced without an epilogue pass.
                    let fused = gsu == 1;
                    variants.push(
                        KernelVariant::new(name, types, MacroTile { m: mt_m, n: mt_n })
                            .with_transpose(trans_a, trans_b)
                            .with_depth_u(depth_u)
                            .with_workgroup_size(workgroup)
                            .with_global_split_u(gsu)
                            .with_alignment(alignment)
                            .with_activation(if fused {
                                ActivationType::All
                            } else {
                                ActivationType::None
                            })
                            .with_bias(fused)
                            .with_scale_ab(true),
                    );
                }
            }
        }
    }
    variants
}
