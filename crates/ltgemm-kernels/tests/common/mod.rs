//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;

use ltgemm_kernels::{
    AlgorithmCatalog, AlgorithmHandle, DeviceBuffer, DevicePtr, GemmInputs, GemmPreference,
    GemmProblem, HostScalar, Rejection, SupportChecker, SupportResult,
};

pub const MIB: u64 = 1024 * 1024;

/// Catalog whose support answers come from a table: `None` is unsupported,
/// `Some(bytes)` is supported with that workspace requirement.
pub struct TableCatalog {
    entries: Vec<Option<u64>>,
    ranking: Vec<usize>,
    index_queries: Mutex<Vec<Vec<usize>>>,
    rank_queries: Mutex<usize>,
}

impl TableCatalog {
    pub fn new(entries: Vec<Option<u64>>) -> Self {
        let ranking = (0..entries.len()).collect();
        Self {
            entries,
            ranking,
            index_queries: Mutex::new(Vec::new()),
            rank_queries: Mutex::new(0),
        }
    }

    /// Order returned by `query_by_rank`, best first.
    pub fn with_ranking(mut self, ranking: Vec<usize>) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn index_queries(&self) -> Vec<Vec<usize>> {
        self.index_queries.lock().unwrap().clone()
    }

    pub fn rank_queries(&self) -> usize {
        *self.rank_queries.lock().unwrap()
    }

    fn handle(index: usize) -> AlgorithmHandle {
        AlgorithmHandle::new(index, format!("table_{index}"))
    }
}

impl AlgorithmCatalog for TableCatalog {
    fn query_by_rank(
        &self,
        _problem: &GemmProblem,
        _preference: &GemmPreference,
        top_k: usize,
    ) -> Vec<AlgorithmHandle> {
        *self.rank_queries.lock().unwrap() += 1;
        self.ranking.iter().take(top_k).map(|&i| Self::handle(i)).collect()
    }

    fn query_by_index(&self, indices: &[usize]) -> Vec<AlgorithmHandle> {
        self.index_queries.lock().unwrap().push(indices.to_vec());
        indices.iter().filter(|&&i| i < self.entries.len()).map(|&i| Self::handle(i)).collect()
    }
}

impl SupportChecker for TableCatalog {
    fn check(&self, handle: &AlgorithmHandle, _problem: &GemmProblem) -> SupportResult {
        match self.entries.get(handle.index()) {
            Some(Some(bytes)) => SupportResult::supported(*bytes),
            Some(None) => SupportResult::unsupported(Rejection::EpilogueUnsupported(
                "table entry".into(),
            )),
            None => {
                SupportResult::unsupported(Rejection::UnknownAlgorithm { index: handle.index() })
            }
        }
    }
}

pub fn buffer(addr: u64, len: u64) -> DeviceBuffer {
    DeviceBuffer::new(DevicePtr(addr), len)
}

/// Inputs with 16 MiB operand buffers and alpha = 1, beta = 0.
pub fn inputs() -> GemmInputs {
    GemmInputs::new(
        buffer(0x1000_0000, 16 * MIB),
        buffer(0x2000_0000, 16 * MIB),
        buffer(0x3000_0000, 16 * MIB),
        buffer(0x4000_0000, 16 * MIB),
        HostScalar::new(1.0),
        HostScalar::new(0.0),
    )
}

/// The 1024 x 512 x 1024 half-precision problem used across tests.
pub fn reference_problem() -> GemmProblem {
    GemmProblem::builder(1024, 512, 1024).inputs(inputs()).build().unwrap()
}
