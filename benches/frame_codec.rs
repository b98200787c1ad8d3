//! Frame codec benchmark suite.
//!
//! Measures encoding, masking and decoding at each payload length class:
//! - 7-bit length: 16, 125 bytes
//! - 16-bit length: 4 KiB, 64 KiB - 1
//! - 64-bit length: 1 MiB
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use raw_websocket::protocol::{
    DEFAULT_MAX_PAYLOAD_SIZE, FrameReader, Opcode, apply_mask, decode_frame, encode_frame,
    encode_masked_frame,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[16, 125, 4096, 65535, 1024 * 1024];

const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &size in PAYLOAD_SIZES {
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("unmasked", size), &data, |b, data| {
            b.iter(|| encode_frame(Opcode::Binary, true, data));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Mask
// ============================================================================

fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");

    for &size in PAYLOAD_SIZES {
        let mut data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::new("apply", size), |b| {
            b.iter(|| apply_mask(&mut data, KEY));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(10));

    for &size in PAYLOAD_SIZES {
        let wire = encode_masked_frame(Opcode::Binary, true, &payload(size), KEY);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("masked", size), &wire, |b, wire| {
            b.to_async(&rt).iter(|| async {
                let mut reader = FrameReader::new(wire.as_slice(), Duration::from_secs(5));
                decode_frame(&mut reader, DEFAULT_MAX_PAYLOAD_SIZE)
                    .await
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_mask, bench_decode);
criterion_main!(benches);
