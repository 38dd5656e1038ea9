//! Algorithm catalog: the registry of compiled GEMM kernel variants.
//!
//! Every variant gets a stable index at registration time, starting at 0.
//! A built [`KernelCatalog`] is read-only and can be shared across threads
//! without synchronization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ltgemm_common::{ActivationType, GemmError, GemmTypes, Operation, Result};
use tracing::debug;

use crate::problem::GemmProblem;
use crate::support::{Rejection, SupportChecker, SupportResult};

// ---------------------------------------------------------------------------
// Handles and preferences
// ---------------------------------------------------------------------------

/// Catalog-owned identifier of one kernel variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlgorithmHandle {
    index: usize,
    name: Arc<str>,
}

impl AlgorithmHandle {
    pub fn new(index: usize, name: impl Into<Arc<str>>) -> Self {
        Self { index, name: name.into() }
    }

    /// Stable integer index, valid for direct reuse with
    /// [`AlgorithmCatalog::query_by_index`].
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AlgorithmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.index, self.name)
    }
}

/// Caller preferences passed to ranked queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmPreference {
    /// Candidates needing more than this are ranked after those that fit.
    pub max_workspace_bytes: u64,
}

impl GemmPreference {
    pub fn new() -> Self {
        Self { max_workspace_bytes: u64::MAX }
    }

    #[must_use]
    pub fn with_max_workspace_bytes(mut self, bytes: u64) -> Self {
        self.max_workspace_bytes = bytes;
        self
    }
}

impl Default for GemmPreference {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only registry of algorithm variants.
pub trait AlgorithmCatalog: Send + Sync {
    /// Up to `top_k` handles compatible with `problem`, best first.
    /// Empty when nothing is compatible.
    fn query_by_rank(
        &self,
        problem: &GemmProblem,
        preference: &GemmPreference,
        top_k: usize,
    ) -> Vec<AlgorithmHandle>;

    /// Handles at `indices`, in the requested order. Indices with no
    /// variant are omitted, so an empty result means the requested range is
    /// past the end of the catalog.
    fn query_by_index(&self, indices: &[usize]) -> Vec<AlgorithmHandle>;
}

// ---------------------------------------------------------------------------
// Variant model
// ---------------------------------------------------------------------------

/// Output tile computed by one workgroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacroTile {
    pub m: u32,
    pub n: u32,
}

/// Required element multiples of each problem dimension (1 = none).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alignment {
    pub m: u64,
    pub n: u64,
    pub k: u64,
}

impl Default for Alignment {
    fn default() -> Self {
        Self { m: 1, n: 1, k: 1 }
    }
}

/// Launch shape of a variant, consumed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelGeometry {
    pub macro_tile: MacroTile,
    pub workgroup_size: u32,
    pub global_split_u: u32,
}

impl Default for KernelGeometry {
    fn default() -> Self {
        Self { macro_tile: MacroTile { m: 128, n: 128 }, workgroup_size: 256, global_split_u: 1 }
    }
}

fn one() -> u32 {
    1
}

fn default_workgroup() -> u32 {
    256
}

fn default_depth_u() -> u32 {
    32
}

fn yes() -> bool {
    true
}

/// One compiled kernel variant and the problems it can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelVariant {
    pub name: String,
    pub types: GemmTypes,
    #[serde(default)]
    pub trans_a: Operation,
    #[serde(default)]
    pub trans_b: Operation,
    pub macro_tile: MacroTile,
    /// K-loop unroll depth.
    #[serde(default = "default_depth_u")]
    pub depth_u: u32,
    #[serde(default = "default_workgroup")]
    pub workgroup_size: u32,
    /// Number of K-splits whose partials are reduced through the workspace.
    #[serde(default = "one")]
    pub global_split_u: u32,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default = "yes")]
    pub supports_batched: bool,
    /// Activation capability; `all` accepts any requestable activation.
    #[serde(default)]
    pub activation: ActivationType,
    #[serde(default)]
    pub supports_bias: bool,
    #[serde(default)]
    pub supports_scale_ab: bool,
    #[serde(default)]
    pub priority: i64,
}

impl KernelVariant {
    pub fn new(name: impl Into<String>, types: GemmTypes, macro_tile: MacroTile) -> Self {
        Self {
            name: name.into(),
            types,
            trans_a: Operation::N,
            trans_b: Operation::N,
            macro_tile,
            depth_u: default_depth_u(),
            workgroup_size: default_workgroup(),
            global_split_u: 1,
            alignment: Alignment::default(),
            supports_batched: true,
            activation: ActivationType::None,
            supports_bias: false,
            supports_scale_ab: false,
            priority: 0,
        }
    }

    #[must_use]
    pub fn with_transpose(mut self, trans_a: Operation, trans_b: Operation) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    #[must_use]
    pub fn with_depth_u(mut self, depth_u: u32) -> Self {
        self.depth_u = depth_u;
        self
    }

    #[must_use]
    pub fn with_workgroup_size(mut self, size: u32) -> Self {
        self.workgroup_size = size;
        self
    }

    #[must_use]
    pub fn with_global_split_u(mut self, gsu: u32) -> Self {
        self.global_split_u = gsu.max(1);
        self
    }

    #[must_use]
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    #[must_use]
    pub fn with_batched(mut self, supported: bool) -> Self {
        self.supports_batched = supported;
        self
    }

    #[must_use]
    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    #[must_use]
    pub fn with_bias(mut self, supported: bool) -> Self {
        self.supports_bias = supported;
        self
    }

    #[must_use]
    pub fn with_scale_ab(mut self, supported: bool) -> Self {
        self.supports_scale_ab = supported;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn geometry(&self) -> KernelGeometry {
        KernelGeometry {
            macro_tile: self.macro_tile,
            workgroup_size: self.workgroup_size,
            global_split_u: self.global_split_u.max(1),
        }
    }

    /// First rule `problem` breaks, or `None` when the variant can run it.
    pub fn rejection(&self, problem: &GemmProblem) -> Option<Rejection> {
        if *problem.types() != self.types {
            return Some(Rejection::TypeMismatch { expected: self.types, found: *problem.types() });
        }
        if (problem.trans_a(), problem.trans_b()) != (self.trans_a, self.trans_b) {
            return Some(Rejection::LayoutMismatch {
                expected: (self.trans_a, self.trans_b),
                found: (problem.trans_a(), problem.trans_b()),
            });
        }
        let align = self.alignment;
        for (dim, value, multiple) in
            [('m', problem.m(), align.m), ('n', problem.n(), align.n), ('k', problem.k(), align.k)]
        {
            if multiple > 1 && value % multiple != 0 {
                return Some(Rejection::Alignment { dim, value, multiple });
            }
        }
        if problem.batch_count() > 1 && !self.supports_batched {
            return Some(Rejection::BatchingUnsupported { batch_count: problem.batch_count() });
        }
        let epilogue = problem.epilogue();
        if !self.activation.accepts(epilogue.activation) {
            return Some(Rejection::EpilogueUnsupported(format!(
                "activation '{}' not available (kernel provides '{}')",
                epilogue.activation, self.activation
            )));
        }
        if epilogue.bias && !self.supports_bias {
            return Some(Rejection::EpilogueUnsupported("bias not available".into()));
        }
        if problem.inputs().has_scale_ab() && !self.supports_scale_ab {
            return Some(Rejection::EpilogueUnsupported("scale A/B not available".into()));
        }
        let gsu = u64::from(self.global_split_u.max(1));
        if gsu > 1 {
            let needed = gsu * u64::from(self.depth_u);
            if problem.k() < needed {
                return Some(Rejection::SplitTooDeep { k: problem.k(), needed });
            }
        }
        None
    }

    /// Scratch bytes for split-K partials: `m * n * batch * acc * gsu`,
    /// zero without a split.
    pub fn workspace_bytes(&self, problem: &GemmProblem) -> u64 {
        let gsu = u64::from(self.global_split_u.max(1));
        if gsu == 1 {
            return 0;
        }
        problem
            .m()
            .saturating_mul(problem.n())
            .saturating_mul(problem.batch_count())
            .saturating_mul(problem.types().compute.accumulator_bytes())
            .saturating_mul(gsu)
    }

    /// Heuristic score for `problem` (higher = better). Only meaningful for
    /// compatible problems.
    pub fn score(&self, problem: &GemmProblem) -> i64 {
        let mt_m = u128::from(self.macro_tile.m.max(1));
        let mt_n = u128::from(self.macro_tile.n.max(1));
        // Per axis, so the product stays at most 1000 * 1000.
        let per_mille = |dim: u64, tile: u128| {
            let dim = u128::from(dim);
            (dim * 1000 / (dim.div_ceil(tile) * tile).max(1)) as i64
        };
        let utilization = per_mille(problem.m(), mt_m) * per_mille(problem.n(), mt_n) / 1000;
        let area = (mt_m * mt_n / 256) as i64;
        let split_steps = i64::from(self.global_split_u.max(1).ilog2());
        utilization + area + self.priority - 50 * split_steps
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogManifest {
    #[serde(rename = "variant", default)]
    variants: Vec<KernelVariant>,
}

/// Builder that assigns indices in registration order.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    variants: Vec<KernelVariant>,
    names: HashSet<String>,
}

impl CatalogBuilder {
    /// Register a variant and return its index. Names must be unique.
    pub fn register(&mut self, variant: KernelVariant) -> Result<usize> {
        if variant.name.is_empty() {
            return Err(GemmError::Catalog("variant name must not be empty".into()));
        }
        if variant.macro_tile.m == 0 || variant.macro_tile.n == 0 {
            return Err(GemmError::Catalog(format!(
                "variant '{}' has an empty macro tile",
                variant.name
            )));
        }
        if !self.names.insert(variant.name.clone()) {
            return Err(GemmError::Catalog(format!("duplicate variant name '{}'", variant.name)));
        }
        self.variants.push(variant);
        Ok(self.variants.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn build(self) -> KernelCatalog {
        KernelCatalog::from_registered(self.variants)
    }
}

/// In-memory [`AlgorithmCatalog`] over a list of [`KernelVariant`]s.
#[derive(Debug, Clone)]
pub struct KernelCatalog {
    variants: Vec<KernelVariant>,
    handles: Vec<AlgorithmHandle>,
}

impl KernelCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Build from a list, indexing variants in list order.
    pub fn from_variants(variants: impl IntoIterator<Item = KernelVariant>) -> Result<Self> {
        let mut builder = Self::builder();
        for variant in variants {
            builder.register(variant)?;
        }
        Ok(builder.build())
    }

    pub(crate) fn from_registered(variants: Vec<KernelVariant>) -> Self {
        let handles = variants
            .iter()
            .enumerate()
            .map(|(index, v)| AlgorithmHandle::new(index, v.name.as_str()))
            .collect();
        Self { variants, handles }
    }

    /// Parse a TOML solution library made of `[[variant]]` tables.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let manifest: CatalogManifest = toml::from_str(toml_str)
            .map_err(|e| GemmError::Catalog(format!("failed to parse catalog: {e}")))?;
        let catalog = Self::from_variants(manifest.variants)?;
        debug!(variants = catalog.len(), "loaded kernel catalog");
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GemmError::Catalog(format!("failed to read catalog {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Serialize back to the `[[variant]]` manifest format.
    pub fn to_toml(&self) -> Result<String> {
        let manifest = CatalogManifest { variants: self.variants.clone() };
        toml::to_string_pretty(&manifest)
            .map_err(|e| GemmError::Catalog(format!("failed to serialize catalog: {e}")))
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn variant(&self, index: usize) -> Option<&KernelVariant> {
        self.variants.get(index)
    }

    pub fn handle(&self, index: usize) -> Option<&AlgorithmHandle> {
        self.handles.get(index)
    }

    pub fn handles(&self) -> &[AlgorithmHandle] {
        &self.handles
    }

    /// Variant behind `handle`, if the handle belongs to this catalog.
    fn resolve(&self, handle: &AlgorithmHandle) -> Option<&KernelVariant> {
        self.handles
            .get(handle.index())
            .filter(|h| h.name() == handle.name())
            .and_then(|_| self.variants.get(handle.index()))
    }
}

impl AlgorithmCatalog for KernelCatalog {
    fn query_by_rank(
        &self,
        problem: &GemmProblem,
        preference: &GemmPreference,
        top_k: usize,
    ) -> Vec<AlgorithmHandle> {
        if top_k == 0 {
            return Vec::new();
        }
        let mut ranked: Vec<(bool, i64, usize)> = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| v.rejection(problem).is_none())
            .map(|(i, v)| {
                let over = v.workspace_bytes(problem) > preference.max_workspace_bytes;
                (over, v.score(problem), i)
            })
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        ranked.into_iter().take(top_k).map(|(_, _, i)| self.handles[i].clone()).collect()
    }

    fn query_by_index(&self, indices: &[usize]) -> Vec<AlgorithmHandle> {
        indices.iter().filter_map(|&i| self.handles.get(i).cloned()).collect()
    }
}

impl SupportChecker for KernelCatalog {
    fn check(&self, handle: &AlgorithmHandle, problem: &GemmProblem) -> SupportResult {
        let Some(variant) = self.resolve(handle) else {
            let rejection = Rejection::UnknownAlgorithm { index: handle.index() };
            return SupportResult::unsupported(rejection);
        };
        match variant.rejection(problem) {
            Some(rejection) => SupportResult::unsupported(rejection),
            None => SupportResult::supported(variant.workspace_bytes(problem)),
        }
    }

    fn geometry(&self, handle: &AlgorithmHandle) -> KernelGeometry {
        self.resolve(handle).map(KernelVariant::geometry).unwrap_or_default()
    }
}
