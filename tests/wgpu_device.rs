// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Round trips on a real adapter.  Every test returns early on machines without one.
#![cfg(feature = "backend_wgpu")]

use dats_and_texs::{
    BackendError, BoundDevice, BufferType, Context, DatFlags, ImageLayout, PixelFormat, TexDims,
};

fn context() -> Option<Context> {
    match BoundDevice::new() {
        Ok(device) => Some(Context::new(device).expect("context")),
        Err(BackendError::NoSuchAdapter) => {
            println!("no adapter, skipping");
            None
        }
        Err(error) => panic!("binding a device failed: {error}"),
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 % 251) as u8 + 1).collect()
}

#[test]
fn buffer_round_trips_of_any_length() {
    let Some(mut context) = context() else {
        return;
    };
    for buffer_type in [BufferType::Vertex, BufferType::Storage, BufferType::Mappable] {
        for len in [1, 3, 4, 5, 13, 4099] {
            let dat = context
                .create_dat(buffer_type, len as u64, 1, DatFlags::SHARED)
                .unwrap();
            let data = pattern(len);
            context.upload_dat(&dat, 0, &data).unwrap();
            let mut out = vec![0; len];
            context.download_dat(&dat, 0, &mut out).unwrap();
            assert_eq!(out, data, "{buffer_type:?}, {len} bytes");
        }
    }
}

#[test]
fn unaligned_writes_keep_their_neighbours() {
    let Some(mut context) = context() else {
        return;
    };
    let dat = context
        .create_dat(BufferType::Vertex, 11, 1, DatFlags::SHARED)
        .unwrap();
    context.upload_dat(&dat, 0, &[9; 11]).unwrap();
    context.upload_dat(&dat, 3, &[1, 2, 3]).unwrap();

    let mut out = [0; 11];
    context.download_dat(&dat, 0, &mut out).unwrap();
    assert_eq!(out, [9, 9, 9, 1, 2, 3, 9, 9, 9, 9, 9]);

    let mut middle = [0; 2];
    context.download_dat(&dat, 4, &mut middle).unwrap();
    assert_eq!(middle, [2, 3]);
}

#[test]
fn copies_at_odd_offsets() {
    let Some(mut context) = context() else {
        return;
    };
    let src = context
        .create_dat(BufferType::Storage, 10, 1, DatFlags::SHARED)
        .unwrap();
    let dst = context
        .create_dat(BufferType::Storage, 10, 1, DatFlags::SHARED)
        .unwrap();
    context.upload_dat(&src, 0, &pattern(10)).unwrap();
    context.upload_dat(&dst, 0, &[0; 10]).unwrap();
    context
        .copy_buffer(src.regions(), 1, dst.regions(), 2, 5)
        .unwrap();

    let mut out = [0; 10];
    context.download_dat(&dst, 0, &mut out).unwrap();
    let mut expected = [0; 10];
    expected[2..7].copy_from_slice(&pattern(10)[1..6]);
    assert_eq!(out, expected);
}

#[test]
fn texture_round_trip() {
    let Some(mut context) = context() else {
        return;
    };
    let texture = context
        .create_texture(TexDims::D2, [3, 2, 1], PixelFormat::R8Unorm)
        .unwrap();
    let data = pattern(6);
    context
        .upload_texture(&texture, [0, 0, 0], [0, 0, 0], &data)
        .unwrap();
    let mut out = vec![0; 6];
    context
        .download_texture(&texture, [0, 0, 0], [0, 0, 0], &mut out)
        .unwrap();
    assert_eq!(out, data);
    assert_eq!(texture.layout().unwrap(), ImageLayout::ShaderReadOnly);
}
