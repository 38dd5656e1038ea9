//! Handles for caller-owned memory.
//!
//! Device memory is allocated and freed by the caller. These types only
//! carry addresses and capacities; nothing here dereferences a device
//! address.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    pub const NULL: DevicePtr = DevicePtr(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn addr(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A caller-allocated device region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceBuffer {
    pub ptr: DevicePtr,
    pub len_bytes: u64,
}

impl DeviceBuffer {
    pub const fn new(ptr: DevicePtr, len_bytes: u64) -> Self {
        Self { ptr, len_bytes }
    }

    /// An absent buffer (null, zero length).
    pub const fn null() -> Self {
        Self { ptr: DevicePtr::NULL, len_bytes: 0 }
    }

    pub const fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// True when the buffer is non-null and holds at least `bytes`.
    pub const fn holds(&self, bytes: u64) -> bool {
        !self.ptr.is_null() && self.len_bytes >= bytes
    }
}

/// Host-resident `f32` shared between the caller and a GEMM problem.
///
/// The caller may update the value at any time. Execution plans read it
/// once, when they are initialized, and keep that snapshot until the next
/// initialization.
#[derive(Clone, Default)]
pub struct HostScalar(Arc<AtomicU32>);

impl HostScalar {
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

impl fmt::Debug for HostScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostScalar").field(&self.get()).finish()
    }
}

impl From<f32> for HostScalar {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}
