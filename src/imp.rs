// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Device backends.
//!
//! Exactly one backend is compiled in.  Without features the `soft` backend emulates a device in
//! host memory; with `backend_wgpu` the wgpu backend drives a real adapter.  Both expose the same
//! surface: [BoundDevice], `GpuBuffer`, `GpuImage`, `GpuSampler` and a one-shot `Commands`
//! recorder.

/// Hardware queue a wait targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Transfer,
    Compute,
    Render,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Transfer, QueueKind::Compute, QueueKind::Render];
}

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// The host may read and write the buffer directly.
    HostVisible,
    /// Only reachable through GPU copies.
    DeviceLocal,
}

#[cfg(not(feature = "backend_wgpu"))]
mod soft;
#[cfg(not(feature = "backend_wgpu"))]
pub use soft::*;

#[cfg(feature = "backend_wgpu")]
mod wgpu;
#[cfg(feature = "backend_wgpu")]
pub use self::wgpu::*;
