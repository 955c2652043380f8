// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Errors returned by the context, the transfer queue and the transfer operations.

use crate::buffer::BufferType;
use crate::pixel_formats::PixelFormat;
use crate::transfers::queue::SubQueue;
use crate::transfers::task::TaskKind;

/// Everything that can go wrong in this crate.
///
/// Caller mistakes (zero sizes, stale handles, out-of-range offsets) are reported here.
/// Corrupted allocator state is not; that panics.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("requested a zero-sized allocation")]
    ZeroSize,
    #[error("unknown buffer type {0}")]
    UnknownBufferType(u32),
    #[error("no live buffer of type {0:?}")]
    BufferNotFound(BufferType),
    #[error("the buffer backing this region was destroyed or reset")]
    StaleRegion,
    #[error("the texture was destroyed or reset")]
    StaleTexture,
    #[error("range {offset}..{end} exceeds size {size}")]
    OutOfBounds { offset: u64, end: u64, size: u64 },
    #[error("{count} items requested, at most {max} allowed")]
    TooManyItems { count: u32, max: u32 },
    #[error("resizing a region group of count {0} is not supported, only count 1")]
    UnsupportedRegionCount(u32),
    #[error("buffer of type {0:?} has no persistent host mapping")]
    NotMappable(BufferType),
    #[error("textures have 1, 2 or 3 dimensions, not {0}")]
    InvalidDims(u32),
    #[error("cannot copy {src:?} texels into a {dst:?} texture")]
    FormatMismatch { src: PixelFormat, dst: PixelFormat },
    #[error("payload is {actual} bytes, expected {expected}")]
    PayloadSize { expected: u64, actual: u64 },
    #[error("no callback registered for {kind:?} on {queue:?}")]
    MissingCallback { queue: SubQueue, kind: TaskKind },
    #[error("{0:?} callback panicked")]
    TaskPanicked(TaskKind),
    #[error("the transfer worker has stopped")]
    WorkerStopped,
    #[error("failed to spawn the transfer worker")]
    WorkerSpawn(#[source] std::io::Error),
    #[error(transparent)]
    Backend(#[from] crate::imp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
