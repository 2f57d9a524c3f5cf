// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the blocking queue.
//!
//! Measures:
//! - Offer latency at different payload sizes
//! - Drain (poll) throughput
//! - A full produce-then-consume cycle

use std::hint::black_box;

use chronicle_blocking_queue::{BlockingQueue, QueueBuilder, Result};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tempfile::TempDir;

/// Payload sizes to benchmark (bytes).
const PAYLOAD_SIZES: &[usize] = &[64, 256, 1024, 4096];

/// Messages per throughput measurement.
const BATCH: usize = 1_000;

fn write_raw(value: &Vec<u8>, buf: &mut Vec<u8>) -> Result<()> {
    buf.extend_from_slice(value);
    Ok(())
}

fn read_raw(bytes: &[u8]) -> Result<Vec<u8>> { Ok(bytes.to_vec()) }

/// A raw-bytes queue in a fresh temporary directory, sized so the benches
/// exercise rollover without unbounded disk use.
fn create_queue(temp_dir: &TempDir) -> BlockingQueue<Vec<u8>> {
    QueueBuilder::new(temp_dir.path())
        .name("bench")
        .slab_block_size(16 * 1024 * 1024)
        .message_capacity(64 * 1024)
        .serializer(write_raw)
        .deserializer(read_raw)
        .build_with_codec()
        .unwrap()
}

fn bench_offer(c: &mut Criterion) {
    let mut group = c.benchmark_group("offer");

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir);
            let payload = vec![0xAB; size];

            b.iter(|| {
                for _ in 0..BATCH {
                    assert!(queue.offer(black_box(payload.clone())).unwrap());
                }
                let mut sink = Vec::with_capacity(BATCH);
                queue.drain_to(&mut sink, BATCH).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    for &size in &[64usize, 1024] {
        group.throughput(Throughput::Bytes((size * BATCH) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir);
            let payload = vec![0xCD; size];

            b.iter_batched(
                || {
                    for _ in 0..BATCH {
                        queue.offer(payload.clone()).unwrap();
                    }
                },
                |()| {
                    let mut sink = Vec::with_capacity(BATCH);
                    queue.drain_to(&mut sink, BATCH).unwrap();
                    black_box(sink)
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_peek(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let queue = create_queue(&temp_dir);
    queue.offer(vec![0xEF; 256]).unwrap();

    c.bench_function("peek", |b| {
        b.iter(|| black_box(queue.peek().unwrap()));
    });
}

criterion_group!(benches, bench_offer, bench_drain, bench_peek);
criterion_main!(benches);
