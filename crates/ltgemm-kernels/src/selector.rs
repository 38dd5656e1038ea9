//! Algorithm selection under a workspace budget.
//!
//! Both strategies are first-fit in a fixed scan order: the winner is the
//! earliest candidate that is supported and needs no more than the budget.
//! Parallel checking changes how fast that candidate is found, never which
//! one it is.

use std::fmt;

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use ltgemm_common::{GemmConfig, GemmError, Result, StrategyKind};

use crate::catalog::{AlgorithmCatalog, AlgorithmHandle, GemmPreference};
use crate::problem::GemmProblem;
use crate::support::{SupportChecker, SupportResult};

/// How candidates are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Check the catalog's `top_k` best-ranked handles in rank order.
    Heuristic { top_k: usize },
    /// Walk the whole index space from 0 in fixed-size batches.
    Exhaustive,
    /// Reuse a previously selected index without searching.
    Direct { index: usize },
}

impl Strategy {
    /// Strategy named by the configuration file.
    pub fn from_config(config: &GemmConfig) -> Self {
        match config.default_strategy {
            StrategyKind::Heuristic => Self::Heuristic { top_k: config.default_top_k },
            StrategyKind::Exhaustive => Self::Exhaustive,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic { top_k } => write!(f, "heuristic(top_k={top_k})"),
            Self::Exhaustive => write!(f, "exhaustive"),
            Self::Direct { index } => write!(f, "direct(index={index})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorConfig {
    /// Indices requested per exhaustive round.
    pub batch_size: usize,
    /// Hard upper bound on the exhaustive index space.
    pub max_scan_indices: usize,
    /// Check candidates of one round on the rayon pool.
    pub parallel_check: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { batch_size: 100, max_scan_indices: 1 << 20, parallel_check: false }
    }
}

impl From<&GemmConfig> for SelectorConfig {
    fn from(config: &GemmConfig) -> Self {
        Self {
            batch_size: config.index_batch_size,
            max_scan_indices: config.max_scan_indices,
            parallel_check: config.parallel_check,
        }
    }
}

/// Winning algorithm and the workspace it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub handle: AlgorithmHandle,
    pub required_workspace_bytes: u64,
    pub strategy: Strategy,
    /// Candidates evaluated up to and including the winner.
    pub candidates_checked: usize,
}

/// Picks one algorithm for a problem from a catalog and a support checker.
pub struct Selector<'a> {
    catalog: &'a dyn AlgorithmCatalog,
    checker: &'a dyn SupportChecker,
    config: SelectorConfig,
}

impl<'a> Selector<'a> {
    pub fn new(catalog: &'a dyn AlgorithmCatalog, checker: &'a dyn SupportChecker) -> Self {
        Self { catalog, checker, config: SelectorConfig::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn select(
        &self,
        problem: &GemmProblem,
        budget: u64,
        strategy: Strategy,
    ) -> Result<Selection> {
        match strategy {
            Strategy::Heuristic { top_k } => self.select_heuristic(problem, budget, top_k),
            Strategy::Exhaustive => self.select_exhaustive(problem, budget),
            Strategy::Direct { index } => self.select_by_index(problem, budget, index),
        }
    }

    /// Select with the budget and strategy from `config`. Scan settings
    /// still come from this selector's `SelectorConfig`.
    pub fn select_with_config(
        &self,
        problem: &GemmProblem,
        config: &GemmConfig,
    ) -> Result<Selection> {
        self.select(problem, config.max_workspace_bytes, Strategy::from_config(config))
    }

    /// First ranked handle that fits `budget`. No fallback to other
    /// strategies when the ranked list runs out.
    pub fn select_heuristic(
        &self,
        problem: &GemmProblem,
        budget: u64,
        top_k: usize,
    ) -> Result<Selection> {
        if top_k == 0 {
            return Err(GemmError::InvalidProblem("top_k must be at least 1".into()));
        }
        let strategy = Strategy::Heuristic { top_k };
        let preference = GemmPreference::new().with_max_workspace_bytes(budget);
        let ranked = self.catalog.query_by_rank(problem, &preference, top_k);
        // Catalogs may hand back more than asked; only the first top_k count.
        let ranked = &ranked[..ranked.len().min(top_k)];

        match self.first_fit(problem, budget, ranked) {
            Some((pos, result)) => {
                Ok(self.winner(ranked[pos].clone(), result, strategy, pos + 1))
            }
            None => Err(self.not_found(problem, strategy, ranked.len())),
        }
    }

    /// First handle in ascending index order that fits `budget`. Stops at
    /// the first empty batch or at `max_scan_indices`.
    pub fn select_exhaustive(&self, problem: &GemmProblem, budget: u64) -> Result<Selection> {
        let SelectorConfig { batch_size, max_scan_indices, .. } = self.config;
        if batch_size == 0 {
            return Err(GemmError::InvalidProblem("index batch size must be at least 1".into()));
        }
        let strategy = Strategy::Exhaustive;
        let mut checked = 0usize;
        let mut start = 0usize;

        while start < max_scan_indices {
            let end = start.saturating_add(batch_size).min(max_scan_indices);
            let indices: Vec<usize> = (start..end).collect();
            let mut handles = self.catalog.query_by_index(&indices);
            if handles.is_empty() {
                trace!(start, end, "index space exhausted");
                return Err(self.not_found(problem, strategy, checked));
            }
            handles.sort_by_key(AlgorithmHandle::index);

            if let Some((pos, result)) = self.first_fit(problem, budget, &handles) {
                let handle = handles.swap_remove(pos);
                return Ok(self.winner(handle, result, strategy, checked + pos + 1));
            }
            checked += handles.len();
            start = end;
        }

        warn!(max_scan_indices, checked, "exhaustive scan stopped at index bound");
        Err(self.not_found(problem, strategy, checked))
    }

    /// Re-validate one saved index against `problem` and `budget`.
    pub fn select_by_index(
        &self,
        problem: &GemmProblem,
        budget: u64,
        index: usize,
    ) -> Result<Selection> {
        let strategy = Strategy::Direct { index };
        let Some(handle) = self.catalog.query_by_index(&[index]).into_iter().next() else {
            return Err(self.not_found(problem, strategy, 0));
        };
        let result = self.checker.check(&handle, problem);
        if !result.supported {
            let reason = result
                .rejection
                .map(|r| r.to_string())
                .unwrap_or_else(|| "rejected by support check".into());
            return Err(GemmError::Unsupported { index, reason });
        }
        if result.required_workspace_bytes > budget {
            return Err(GemmError::BudgetExceeded {
                index,
                required: result.required_workspace_bytes,
                budget,
            });
        }
        Ok(self.winner(handle, result, strategy, 1))
    }

    /// Position of the first handle in `handles` that fits.
    fn first_fit(
        &self,
        problem: &GemmProblem,
        budget: u64,
        handles: &[AlgorithmHandle],
    ) -> Option<(usize, SupportResult)> {
        let evaluate = |pos: usize, handle: &AlgorithmHandle| {
            let result = self.checker.check(handle, problem);
            if !result.fits(budget) {
                log_skip(handle, &result, budget);
            }
            (pos, result)
        };

        if self.config.parallel_check {
            handles
                .par_iter()
                .enumerate()
                .map(|(pos, handle)| evaluate(pos, handle))
                .find_first(|(_, result)| result.fits(budget))
        } else {
            handles
                .iter()
                .enumerate()
                .map(|(pos, handle)| evaluate(pos, handle))
                .find(|(_, result)| result.fits(budget))
        }
    }

    fn winner(
        &self,
        handle: AlgorithmHandle,
        result: SupportResult,
        strategy: Strategy,
        candidates_checked: usize,
    ) -> Selection {
        debug!(
            index = handle.index(),
            name = handle.name(),
            workspace = result.required_workspace_bytes,
            %strategy,
            candidates_checked,
            "selected algorithm"
        );
        Selection {
            handle,
            required_workspace_bytes: result.required_workspace_bytes,
            strategy,
            candidates_checked,
        }
    }

    fn not_found(&self, problem: &GemmProblem, strategy: Strategy, checked: usize) -> GemmError {
        warn!(%problem, %strategy, checked, "no algorithm fits");
        GemmError::NotFound { problem: problem.to_string(), checked }
    }
}

fn log_skip(handle: &AlgorithmHandle, result: &SupportResult, budget: u64) {
    match &result.rejection {
        Some(rejection) => trace!(index = handle.index(), %rejection, "skipping unsupported"),
        None if !result.supported => trace!(index = handle.index(), "skipping unsupported"),
        None => trace!(
            index = handle.index(),
            required = result.required_workspace_bytes,
            budget,
            "skipping over budget"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{KernelCatalog, KernelVariant, MacroTile};
    use crate::problem::GemmInputs;
    use ltgemm_common::{DeviceBuffer, DevicePtr, GemmTypes, HostScalar};

    fn problem() -> GemmProblem {
        let buf = DeviceBuffer::new(DevicePtr(0x1000), u64::MAX);
        GemmProblem::builder(256, 256, 512)
            .inputs(GemmInputs::new(buf, buf, buf, buf, HostScalar::new(1.0), HostScalar::new(0.0)))
            .build()
            .unwrap()
    }

    fn catalog() -> KernelCatalog {
        let tile = MacroTile { m: 128, n: 128 };
        KernelCatalog::from_variants([
            KernelVariant::new("f32_only", GemmTypes::sss(), tile),
            KernelVariant::new("split8", GemmTypes::hhs(), tile).with_global_split_u(8),
            KernelVariant::new("split2", GemmTypes::hhs(), tile).with_global_split_u(2),
            KernelVariant::new("plain", GemmTypes::hhs(), tile),
        ])
        .unwrap()
    }

    #[test]
    fn exhaustive_takes_earliest_fit_not_cheapest() {
        let cat = catalog();
        let sel = Selector::new(&cat, &cat).select_exhaustive(&problem(), u64::MAX).unwrap();
        assert_eq!(sel.handle.name(), "split8");
        assert_eq!(sel.candidates_checked, 2);
    }

    #[test]
    fn config_supplies_budget_and_strategy() {
        let cat = catalog();
        let config = GemmConfig {
            max_workspace_bytes: 512 * 1024,
            default_strategy: StrategyKind::Exhaustive,
            ..GemmConfig::default()
        };
        let sel = Selector::new(&cat, &cat).select_with_config(&problem(), &config).unwrap();
        assert_eq!(sel.handle.name(), "split2");
        assert_eq!(sel.strategy, Strategy::Exhaustive);
    }

    #[test]
    fn exhaustive_skips_over_budget() {
        let cat = catalog();
        // split2 needs 256*256*4*2 = 512 KiB
        let sel = Selector::new(&cat, &cat).select_exhaustive(&problem(), 512 * 1024).unwrap();
        assert_eq!(sel.handle.name(), "split2");
        assert_eq!(sel.required_workspace_bytes, 512 * 1024);
    }

    #[test]
    fn small_batches_cross_boundaries() {
        let cat = catalog();
        let config = SelectorConfig { batch_size: 1, ..SelectorConfig::default() };
        let sel =
            Selector::new(&cat, &cat).with_config(config).select_exhaustive(&problem(), 0).unwrap();
        assert_eq!(sel.handle.index(), 3);
        assert_eq!(sel.candidates_checked, 4);
    }

    #[test]
    fn scan_bound_ends_in_not_found() {
        let cat = catalog();
        let config = SelectorConfig { batch_size: 1, max_scan_indices: 3, parallel_check: false };
        let err = Selector::new(&cat, &cat)
            .with_config(config)
            .select_exhaustive(&problem(), 0)
            .unwrap_err();
        assert!(matches!(err, GemmError::NotFound { checked: 3, .. }), "{err}");
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let cat = catalog();
        let config = SelectorConfig { batch_size: 0, ..SelectorConfig::default() };
        let err = Selector::new(&cat, &cat)
            .with_config(config)
            .select_exhaustive(&problem(), 0)
            .unwrap_err();
        assert!(matches!(err, GemmError::InvalidProblem(_)));
    }

    #[test]
    fn zero_top_k_is_invalid() {
        let cat = catalog();
        let err = Selector::new(&cat, &cat).select_heuristic(&problem(), 0, 0).unwrap_err();
        assert!(matches!(err, GemmError::InvalidProblem(_)));
    }

    #[test]
    fn direct_index_reports_specific_failures() {
        let cat = catalog();
        let sel = Selector::new(&cat, &cat);
        let p = problem();
        assert!(matches!(
            sel.select_by_index(&p, u64::MAX, 0),
            Err(GemmError::Unsupported { index: 0, .. })
        ));
        assert!(matches!(
            sel.select_by_index(&p, 0, 1),
            Err(GemmError::BudgetExceeded { index: 1, budget: 0, .. })
        ));
        assert!(matches!(sel.select_by_index(&p, 0, 42), Err(GemmError::NotFound { .. })));
        let ok = sel.select_by_index(&p, 0, 3).unwrap();
        assert_eq!(ok.strategy, Strategy::Direct { index: 3 });
    }

    #[test]
    fn strategy_follows_config() {
        let mut config = GemmConfig::default();
        config.default_top_k = 4;
        assert_eq!(Strategy::from_config(&config), Strategy::Heuristic { top_k: 4 });
        config.default_strategy = StrategyKind::Exhaustive;
        assert_eq!(Strategy::from_config(&config), Strategy::Exhaustive);
    }

    #[test]
    fn selector_config_follows_gemm_config() {
        let config = GemmConfig { index_batch_size: 7, parallel_check: true, ..Default::default() };
        let sc = SelectorConfig::from(&config);
        assert_eq!(sc.batch_size, 7);
        assert!(sc.parallel_check);
    }
}
