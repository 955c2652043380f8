// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
#![cfg(not(feature = "backend_wgpu"))]

use dats_and_texs::{BoundDevice, BufferType, Context, DatFlags};
use std::time::{Duration, Instant};

/// Small staged transfers must not be throttled by the worker handoff.
///
/// Each round trip crosses to the worker thread and back several times; if the handoff ever
/// degrades into polling with sleeps this test catches it.
#[test]
fn small_round_trips_are_fast() {
    let mut context = Context::new(BoundDevice::new().unwrap()).unwrap();
    let dat = context
        .create_dat(BufferType::Vertex, 256, 1, DatFlags::SHARED)
        .unwrap();
    let data: Vec<u8> = (0..=255).collect();

    let iterations = 50;
    let mut total = Duration::ZERO;
    let mut out = vec![0; 256];
    for i in 0..iterations {
        let start = Instant::now();
        context.upload_dat(&dat, 0, &data).unwrap();
        context.download_dat(&dat, 0, &mut out).unwrap();
        let elapsed = start.elapsed();
        total += elapsed;
        assert_eq!(out, data);
        if elapsed > Duration::from_millis(200) {
            panic!("round trip {i} took {elapsed:?}");
        }
    }
    let average = total / iterations;
    println!("average round trip: {average:?}");
    assert!(
        average < Duration::from_millis(50),
        "round trips average {average:?}"
    );
}
