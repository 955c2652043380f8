// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! dats_and_texs manages GPU memory for a real-time renderer and moves data in and out of it.

Clients ask for logically sized allocations, **dats** (buffer data) and **texs** (texture data),
without knowing which physical buffer backs them.  A [Context] packs many dats into a handful of
large shared buffers, one per [BufferType], and grows them on demand.  Bytes move between host
memory, a staging buffer and device-local memory through a small task pipeline with explicit
dependencies and a background worker.

```
use dats_and_texs::{BoundDevice, BufferType, Context, DatFlags};
# if cfg!(feature = "backend_wgpu") { return Ok(()); }

let mut context = Context::new(BoundDevice::new()?)?;
let dat = context.create_dat(BufferType::Vertex, 12, 1, DatFlags::SHARED)?;
context.upload_dat(&dat, 0, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12])?;

let mut out = [0u8; 12];
context.download_dat(&dat, 0, &mut out)?;
assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
# Ok::<(), dats_and_texs::Error>(())
```

# Memory model

| Buffer type | Default size | Host access | Offset alignment |
|-------------|--------------|-------------|------------------|
| Staging     | 4 MiB        | yes         | none |
| Vertex      | 4 MiB        | no          | none |
| Index       | 4 MiB        | no          | none |
| Storage     | 1 MiB        | no          | none |
| Uniform     | 1 MiB        | no          | device uniform alignment |
| Mappable    | 1 MiB        | persistent mapping | device uniform alignment |

Space in a shared buffer is handed out by a bump [arena::Arena] and only reclaimed by
[Context::reset].  A dat with `count > 1` is a ring with one slot per frame in flight.

# Backends

Without features, a software backend emulates the device in host memory.  The `backend_wgpu`
feature drives a real adapter through [wgpu](https://wgpu.rs) instead.
*/

logwise::declare_logging_domain!();

pub mod arena;
mod bittricks;
pub mod buffer;
pub mod context;
pub mod dat;
mod error;
mod imp;
pub mod pixel_formats;
pub mod sampler;
pub mod texture;
pub mod transfers;

pub use buffer::{BufferRegions, BufferType};
pub use context::{BufferInfo, Context, ContextConfig};
pub use dat::{Dat, DatFlags, Tex};
pub use error::{Error, Result};
pub use imp::Error as BackendError;
pub use imp::{BoundDevice, QueueKind};
pub use pixel_formats::PixelFormat;
pub use sampler::{Sampler, SamplerConfig};
pub use texture::{ImageLayout, TexDims, Texture};
