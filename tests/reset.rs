// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
#![cfg(not(feature = "backend_wgpu"))]

use dats_and_texs::{
    BoundDevice, BufferInfo, BufferType, Context, DatFlags, PixelFormat, SamplerConfig, TexDims,
};

fn snapshot(context: &Context) -> Vec<BufferInfo> {
    BufferType::ALL
        .iter()
        .map(|t| context.buffer_info(*t))
        .collect()
}

fn populate(context: &mut Context) {
    let dat = context
        .create_dat(BufferType::Vertex, 5 * 1024 * 1024, 1, DatFlags::SHARED)
        .unwrap();
    context.upload_dat(&dat, 0, &[1; 64]).unwrap();
    context
        .create_dat(BufferType::Uniform, 64, 3, DatFlags::SHARED)
        .unwrap();
    context
        .create_dat(BufferType::Storage, 64, 1, DatFlags::STANDALONE)
        .unwrap();
    context
        .create_texture(TexDims::D2, [8, 8, 1], PixelFormat::Rgba8Unorm)
        .unwrap();
    context.create_sampler(SamplerConfig::default()).unwrap();
}

#[test]
fn reset_restores_defaults() {
    let mut context = Context::new(BoundDevice::new().unwrap()).unwrap();
    let fresh = snapshot(&context);

    populate(&mut context);
    assert_ne!(snapshot(&context), fresh);
    context.reset().unwrap();
    let first = snapshot(&context);

    populate(&mut context);
    context.reset().unwrap();
    let second = snapshot(&context);

    assert_eq!(first, fresh);
    assert_eq!(second, fresh);
    for info in second {
        assert_eq!(info.allocated_size, 0);
        assert_eq!(info.capacity, info.buffer_type.default_size());
    }
    assert_eq!(context.texture_count(), 0);
    assert_eq!(context.sampler_count(), 0);
    assert_eq!(context.standalone_count(), 0);
}

#[test]
fn handles_outlive_the_context() {
    let mut context = Context::new(BoundDevice::new().unwrap()).unwrap();
    let dat = context
        .create_dat(BufferType::Index, 16, 1, DatFlags::SHARED)
        .unwrap();
    let texture = context
        .create_texture(TexDims::D1, [16, 0, 0], PixelFormat::R8Unorm)
        .unwrap();
    context.destroy();
    assert!(!dat.is_alive());
    assert!(!texture.is_alive());
}

#[test]
fn context_keeps_working_after_reset() {
    let mut context = Context::new(BoundDevice::new().unwrap()).unwrap();
    populate(&mut context);
    context.reset().unwrap();

    let dat = context
        .create_dat(BufferType::Storage, 16, 1, DatFlags::SHARED)
        .unwrap();
    assert_eq!(dat.regions().offsets(), &[0]);
    context.upload_dat(&dat, 0, &[4; 16]).unwrap();
    let mut out = [0; 16];
    context.download_dat(&dat, 0, &mut out).unwrap();
    assert_eq!(out, [4; 16]);
}
