// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Texture samplers owned by a [crate::Context].

use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// How a sampler filters and wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerConfig {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    /// u, v, w
    pub address_mode: [AddressMode; 3],
}

/// Handle to a sampler.  The context owns the sampler; the handle goes stale on destroy or reset.
#[derive(Debug, Clone)]
pub struct Sampler {
    pub(crate) id: u64,
    config: SamplerConfig,
    inner: Weak<crate::imp::GpuSampler>,
}

impl Sampler {
    pub(crate) fn new(id: u64, config: SamplerConfig, inner: &Arc<crate::imp::GpuSampler>) -> Self {
        Sampler {
            id,
            config,
            inner: Arc::downgrade(inner),
        }
    }

    pub fn config(&self) -> SamplerConfig {
        self.config
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}
