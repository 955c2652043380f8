// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Allocation behaviour of the shared buffers, against the software device.
#![cfg(not(feature = "backend_wgpu"))]

use dats_and_texs::context::MAX_DAT_COUNT;
use dats_and_texs::{
    BackendError, BoundDevice, BufferType, Context, ContextConfig, DatFlags, Error,
};

const MIB: u64 = 1024 * 1024;

fn context() -> Context {
    Context::new(BoundDevice::new().expect("software device")).expect("context")
}

#[test]
fn default_buffers() {
    let context = context();
    for buffer_type in BufferType::ALL {
        let info = context.buffer_info(buffer_type);
        assert_eq!(info.capacity, buffer_type.default_size());
        assert_eq!(info.allocated_size, 0);
        assert_eq!(info.reallocations, 0);
        assert_eq!(info.mappable, buffer_type == BufferType::Mappable);
    }
    assert_eq!(context.buffer_info(BufferType::Vertex).capacity, 4 * MIB);
    assert_eq!(context.buffer_info(BufferType::Uniform).capacity, MIB);
    assert_eq!(context.alignment(BufferType::Vertex), 0);
    assert_eq!(context.alignment(BufferType::Uniform), 256);
    assert_eq!(context.alignment(BufferType::Mappable), 256);
}

#[test]
fn uniform_ring_is_aligned() {
    let mut context = context();
    let dat = context
        .create_dat(BufferType::Uniform, 100, 3, DatFlags::SHARED)
        .unwrap();
    assert_eq!(dat.regions().offsets(), &[0, 256, 512]);
    assert_eq!(dat.regions().aligned_size(), 256);
    assert_eq!(dat.size(), 100);

    let second = context
        .create_dat(BufferType::Uniform, 256, 3, DatFlags::SHARED)
        .unwrap();
    assert_eq!(second.regions().offsets(), &[768, 1024, 1280]);
    assert_eq!(
        context.buffer_info(BufferType::Uniform).allocated_size,
        1536
    );
}

#[test]
fn unaligned_types_pack_tightly() {
    let mut context = context();
    let a = context.allocate_regions(BufferType::Vertex, 1, 12).unwrap();
    let b = context.allocate_regions(BufferType::Vertex, 2, 5).unwrap();
    assert_eq!(a.offsets(), &[0]);
    assert_eq!(b.offsets(), &[12, 17]);
    assert_eq!(context.buffer_info(BufferType::Vertex).allocated_size, 22);
}

#[test]
fn buffer_grows_to_next_power_of_two() {
    let mut context = context();
    let dat = context
        .create_dat(BufferType::Storage, MIB + 1, 1, DatFlags::SHARED)
        .unwrap();
    let info = context.buffer_info(BufferType::Storage);
    assert_eq!(info.capacity, 2 * MIB);
    assert_eq!(info.allocated_size, MIB + 1);
    assert_eq!(info.reallocations, 1);
    assert_eq!(dat.regions().offsets(), &[0]);

    // fits without growing again
    context
        .create_dat(BufferType::Storage, 1024, 1, DatFlags::SHARED)
        .unwrap();
    assert_eq!(context.buffer_info(BufferType::Storage).reallocations, 1);
}

#[test]
fn growth_keeps_contents() {
    let mut context = context();
    let dat = context
        .create_dat(BufferType::Vertex, 8, 1, DatFlags::SHARED)
        .unwrap();
    context.upload_dat(&dat, 0, &[9, 8, 7, 6, 5, 4, 3, 2]).unwrap();
    context
        .create_dat(BufferType::Vertex, 5 * MIB, 1, DatFlags::SHARED)
        .unwrap();
    assert_eq!(context.buffer_info(BufferType::Vertex).capacity, 8 * MIB);

    let mut out = [0; 8];
    context.download_dat(&dat, 0, &mut out).unwrap();
    assert_eq!(out, [9, 8, 7, 6, 5, 4, 3, 2]);
}

#[test]
fn failed_growth_leaves_the_arena_alone() {
    let mut context = context();
    let too_big = context.device().max_buffer_size() + 1;
    let before = context.buffer_info(BufferType::Storage);
    assert!(matches!(
        context.create_dat(BufferType::Storage, too_big, 1, DatFlags::SHARED),
        Err(Error::Backend(BackendError::BufferTooLarge { .. }))
    ));
    assert_eq!(context.buffer_info(BufferType::Storage), before);

    let mut dat = context
        .create_dat(BufferType::Storage, 16, 1, DatFlags::SHARED)
        .unwrap();
    assert_eq!(dat.regions().offsets(), &[0]);

    // same for an in-place resize of the last region
    assert!(context.resize_dat(&mut dat, too_big).is_err());
    assert_eq!(dat.size(), 16);
    assert_eq!(context.buffer_info(BufferType::Storage).allocated_size, 16);
    let next = context
        .create_dat(BufferType::Storage, 16, 1, DatFlags::SHARED)
        .unwrap();
    assert_eq!(next.regions().offsets(), &[16]);
    assert_eq!(context.buffer_info(BufferType::Storage).allocated_size, 32);
}

#[test]
fn resize_in_place_only_for_last_region() {
    let mut context = context();
    let mut first = context
        .create_dat(BufferType::Index, 16, 1, DatFlags::SHARED)
        .unwrap();
    let mut last = context
        .create_dat(BufferType::Index, 16, 1, DatFlags::SHARED)
        .unwrap();

    context.resize_dat(&mut last, 64).unwrap();
    assert_eq!(last.regions().offsets(), &[16]);
    assert_eq!(last.size(), 64);
    assert_eq!(context.buffer_info(BufferType::Index).allocated_size, 80);

    context.resize_dat(&mut first, 32).unwrap();
    assert_eq!(first.regions().offsets(), &[80]);
    assert_eq!(context.buffer_info(BufferType::Index).allocated_size, 112);
}

#[test]
fn resizing_a_ring_is_refused() {
    let mut context = context();
    let mut dat = context
        .create_dat(BufferType::Uniform, 64, 2, DatFlags::SHARED)
        .unwrap();
    assert!(matches!(
        context.resize_dat(&mut dat, 128),
        Err(Error::UnsupportedRegionCount(2))
    ));
}

#[test]
fn zero_sizes_are_rejected() {
    let mut context = context();
    assert!(matches!(
        context.create_dat(BufferType::Vertex, 0, 1, DatFlags::SHARED),
        Err(Error::ZeroSize)
    ));
    assert!(matches!(
        context.allocate_regions(BufferType::Vertex, 0, 16),
        Err(Error::ZeroSize)
    ));
}

#[test]
fn dat_count_limit() {
    let mut context = context();
    context
        .create_dat(BufferType::Uniform, 16, MAX_DAT_COUNT, DatFlags::SHARED)
        .unwrap();
    assert!(matches!(
        context.create_dat(BufferType::Uniform, 16, MAX_DAT_COUNT + 1, DatFlags::SHARED),
        Err(Error::TooManyItems { count: 11, max: 10 })
    ));
}

#[test]
fn unknown_buffer_type() {
    assert_eq!(BufferType::try_from(4).unwrap(), BufferType::Uniform);
    assert!(matches!(
        BufferType::try_from(6),
        Err(Error::UnknownBufferType(6))
    ));
}

#[test]
fn standalone_dats_leave_shared_buffers_alone() {
    let mut context = context();
    let dat = context
        .create_dat(BufferType::Vertex, 32, 2, DatFlags::STANDALONE)
        .unwrap();
    assert_eq!(context.standalone_count(), 1);
    assert_eq!(dat.regions().offsets(), &[0, 32]);
    assert_eq!(context.buffer_info(BufferType::Vertex).allocated_size, 0);

    context.upload_dat(&dat, 0, &[1; 32]).unwrap();
    let mut out = [0; 32];
    context.download_dat(&dat, 0, &mut out).unwrap();
    assert_eq!(out, [1; 32]);

    let regions = dat.regions().clone();
    context.destroy_dat(dat).unwrap();
    assert_eq!(context.standalone_count(), 0);
    assert!(!regions.is_alive());
}

#[test]
fn standalone_resize_grows_its_own_buffer() {
    let mut context = context();
    let mut dat = context
        .create_dat(BufferType::Storage, 100, 1, DatFlags::STANDALONE)
        .unwrap();
    context.upload_dat(&dat, 0, &[3; 100]).unwrap();
    context.resize_dat(&mut dat, 300).unwrap();
    assert_eq!(dat.size(), 300);
    assert_eq!(dat.regions().offsets(), &[0]);

    let mut out = [0; 100];
    context.download_dat(&dat, 0, &mut out).unwrap();
    assert_eq!(out, [3; 100]);
    assert_eq!(context.buffer_info(BufferType::Storage).allocated_size, 0);
}

#[test]
fn configured_sizes() {
    let config = ContextConfig::default().with_buffer_size(BufferType::Vertex, 1024);
    let mut context =
        Context::with_config(BoundDevice::new().unwrap(), config).unwrap();
    assert_eq!(context.buffer_info(BufferType::Vertex).capacity, 1024);
    context
        .create_dat(BufferType::Vertex, 1500, 1, DatFlags::SHARED)
        .unwrap();
    assert_eq!(context.buffer_info(BufferType::Vertex).capacity, 2048);
}
