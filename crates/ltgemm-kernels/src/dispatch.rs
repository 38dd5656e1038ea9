//! Enqueueing initialized plans on device streams.
//!
//! `run` only submits work: it returns as soon as the launch sits in the
//! stream's queue. Launches on one stream keep submission order; ordering
//! across streams is up to the caller.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use ltgemm_common::{ActivationType, DevicePtr, GemmError, Result};

use crate::catalog::KernelGeometry;
use crate::plan::ExecutionPlan;
use crate::problem::GemmProblem;

/// Grid/block dimensions of one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: (u32, u32, u32),
    pub block: (u32, u32, u32),
}

impl LaunchConfig {
    /// One workgroup per macro tile of D, times batches and K-splits.
    pub fn for_problem(problem: &GemmProblem, geometry: &KernelGeometry) -> Result<Self> {
        let to_u32 = |what: &str, v: u64| {
            u32::try_from(v)
                .map_err(|_| GemmError::Dispatch(format!("grid {what} dimension {v} overflows")))
        };
        let tiles_m = problem.m().div_ceil(u64::from(geometry.macro_tile.m.max(1)));
        let tiles_n = problem.n().div_ceil(u64::from(geometry.macro_tile.n.max(1)));
        let depth = problem.batch_count().saturating_mul(u64::from(geometry.global_split_u.max(1)));
        Ok(Self {
            grid: (to_u32("x", tiles_m)?, to_u32("y", tiles_n)?, to_u32("z", depth)?),
            block: (geometry.workgroup_size, 1, 1),
        })
    }

    pub fn workgroups(&self) -> u64 {
        u64::from(self.grid.0) * u64::from(self.grid.1) * u64::from(self.grid.2)
    }
}

/// Kernel arguments resolved from a bound plan.
#[derive(Debug, Clone, PartialEq)]
pub struct GemmKernelArgs {
    pub a: DevicePtr,
    pub b: DevicePtr,
    pub c: DevicePtr,
    pub d: DevicePtr,
    pub workspace: DevicePtr,
    pub alpha: f32,
    pub beta: f32,
    pub m: u64,
    pub n: u64,
    pub k: u64,
    pub batch_count: u64,
    pub lda: u64,
    pub ldb: u64,
    pub ldc: u64,
    pub ldd: u64,
    pub activation: ActivationType,
    pub activation_args: Vec<f32>,
    pub bias: Option<DevicePtr>,
    pub scale_a: Option<DevicePtr>,
    pub scale_b: Option<DevicePtr>,
}

/// Everything a stream needs to start one GEMM.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelLaunch {
    pub algorithm_index: usize,
    pub algorithm_name: String,
    pub config: LaunchConfig,
    pub args: GemmKernelArgs,
}

/// Device work queue. Implementations wrap a real device stream; the
/// returned sequence number must increase with each accepted launch.
pub trait DeviceStream: Send + Sync {
    fn id(&self) -> u64;

    /// Queue `launch` without waiting for it to execute.
    fn enqueue(&self, launch: KernelLaunch) -> Result<u64>;
}

/// Receipt for an enqueued launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchTicket {
    pub stream: u64,
    pub sequence: u64,
    pub algorithm_index: usize,
}

impl ExecutionPlan<'_> {
    /// Enqueue the bound algorithm on `stream`.
    ///
    /// Fails before anything is queued when the plan is not initialized.
    pub fn run(&self, stream: &dyn DeviceStream) -> Result<LaunchTicket> {
        let Some(binding) = self.binding() else {
            return Err(GemmError::Dispatch("plan is not initialized".into()));
        };
        let problem = self.problem();
        let inputs = problem.inputs();
        let epilogue = problem.epilogue();

        let config = LaunchConfig::for_problem(problem, &binding.geometry)?;
        let args = GemmKernelArgs {
            a: inputs.a.ptr,
            b: inputs.b.ptr,
            c: inputs.c.ptr,
            d: inputs.d.ptr,
            workspace: binding.workspace.ptr,
            alpha: binding.coefficients.alpha,
            beta: binding.coefficients.beta,
            m: problem.m(),
            n: problem.n(),
            k: problem.k(),
            batch_count: problem.batch_count(),
            lda: problem.lda(),
            ldb: problem.ldb(),
            ldc: problem.ldc(),
            ldd: problem.ldc(),
            activation: epilogue.activation,
            activation_args: epilogue.activation_args.clone(),
            bias: if epilogue.bias { inputs.bias.map(|b| b.ptr) } else { None },
            scale_a: inputs.scale_a.map(|s| s.ptr),
            scale_b: inputs.scale_b.map(|s| s.ptr),
        };
        let algorithm_index = binding.handle.index();
        debug!(
            stream = stream.id(),
            index = algorithm_index,
            grid = ?config.grid,
            block = ?config.block,
            "enqueueing gemm"
        );
        let sequence = stream.enqueue(KernelLaunch {
            algorithm_index,
            algorithm_name: binding.handle.name().to_owned(),
            config,
            args,
        })?;
        Ok(LaunchTicket { stream: stream.id(), sequence, algorithm_index })
    }
}

/// In-process FIFO stream that records launches instead of executing them.
#[derive(Debug)]
pub struct HostStream {
    id: u64,
    next_sequence: AtomicU64,
    queue: Mutex<VecDeque<(u64, KernelLaunch)>>,
}

impl HostStream {
    pub fn new(id: u64) -> Self {
        Self { id, next_sequence: AtomicU64::new(0), queue: Mutex::new(VecDeque::new()) }
    }

    /// Launches queued and not yet drained.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Remove and return every queued launch, oldest first.
    pub fn drain(&self) -> Result<Vec<(u64, KernelLaunch)>> {
        Ok(self.lock()?.drain(..).collect())
    }

    /// Complete all queued work.
    pub fn synchronize(&self) -> Result<()> {
        let completed = self.drain()?.len();
        trace!(stream = self.id, completed, "stream synchronized");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<(u64, KernelLaunch)>>> {
        self.queue
            .lock()
            .map_err(|_| GemmError::Dispatch(format!("stream {} queue poisoned", self.id)))
    }
}

impl DeviceStream for HostStream {
    fn id(&self) -> u64 {
        self.id
    }

    fn enqueue(&self, launch: KernelLaunch) -> Result<u64> {
        let mut queue = self.lock()?;
        // Taken under the lock so sequence order matches queue order.
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        queue.push_back((sequence, launch));
        Ok(sequence)
    }
}
