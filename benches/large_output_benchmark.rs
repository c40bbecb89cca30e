// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Performance Benchmarks for Large Output Handling
//!
//! This module benchmarks:
//! - Marker scanning over large single-host output
//! - Capturing interleaved output from many nodes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fleetrun::executor::{ExitMarker, FleetRunner, ProgressSink};
use fleetrun::node::Node;
use fleetrun::transport::{ScriptedTransport, TransportEvent};
use tokio::runtime::Runtime;

const CHUNK_SIZE: usize = 8192;

/// Create a test runtime for async benchmarks
fn create_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn output_of(size: usize) -> Vec<u8> {
    b"lorem ipsum dolor sit amet exit code\n"
        .iter()
        .copied()
        .cycle()
        .take(size)
        .collect()
}

fn bench_marker_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("marker_scan");

    for size in [1024, 100 * 1024, 1024 * 1024, 10 * 1024 * 1024] {
        let mut data = output_of(size);
        data.extend_from_slice(b"exitcode=0\n");
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("single_host", format!("{size} bytes")),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut scanner = ExitMarker::new().scanner();
                    let mut code = None;
                    for chunk in data.chunks(CHUNK_SIZE) {
                        let scan = scanner.feed(black_box(chunk));
                        code = code.or(scan.exit_code);
                    }
                    assert_eq!(code, Some(0));
                });
            },
        );
    }

    group.finish();
}

fn bench_multi_node_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_node_capture");
    let rt = create_runtime();

    for node_count in [10, 50, 100] {
        let nodes: Vec<Node> = (0..node_count)
            .map(|i| Node::new(format!("node{i}"), 22, "root".to_string()))
            .collect();
        let payload = output_of(64 * 1024);

        // Round-robin interleaving of every node's chunks.
        let mut events = Vec::new();
        for chunk in payload.chunks(CHUNK_SIZE) {
            for node in &nodes {
                events.push(TransportEvent::chunk(node, chunk));
            }
        }
        for node in &nodes {
            events.push(TransportEvent::chunk(node, "exitcode=0\n"));
        }

        group.throughput(Throughput::Bytes((payload.len() * node_count) as u64));
        group.bench_with_input(
            BenchmarkId::new("nodes", node_count),
            &events,
            |b, events| {
                b.iter(|| {
                    rt.block_on(async {
                        let runner = FleetRunner::new(
                            ScriptedTransport::new(events.clone()),
                            nodes.clone(),
                        )
                        .with_progress_sink(ProgressSink::Silent);
                        let report = runner.capture("cat big.log", |_| {}).await.unwrap();
                        assert!(report.is_success());
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_marker_scan, bench_multi_node_capture);
criterion_main!(benches);
