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

//! End-to-end runs of `FleetRunner` over a scripted transport.

use async_trait::async_trait;
use fleetrun::executor::behavior::{self, TransportBehavior};
use fleetrun::executor::{ExitMarker, FleetRunner, ProgressSink, UNKNOWN_EXIT_CODE};
use fleetrun::transport::{ScriptedTransport, Transport, TransportEvent};
use fleetrun::{FleetError, Node, TransportError};
use serial_test::serial;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn node(name: &str) -> Node {
    Node::new(name.to_string(), 22, "root".to_string())
}

fn runner_with(events: Vec<TransportEvent>, hosts: &[&Node]) -> (FleetRunner<ScriptedTransport>, ProgressSink) {
    let sink = ProgressSink::memory();
    let runner = FleetRunner::new(
        ScriptedTransport::new(events),
        hosts.iter().map(|n| (*n).clone()).collect(),
    )
    .with_progress_sink(sink.clone());
    (runner, sink)
}

#[tokio::test]
#[serial]
async fn test_all_hosts_succeed() {
    let (a, b) = (node("a"), node("b"));
    let (runner, sink) = runner_with(
        vec![
            TransportEvent::chunk(&a, "hi\nexitcode=0\n"),
            TransportEvent::chunk(&b, "hi\nexitcode=0\n"),
        ],
        &[&a, &b],
    );

    let mut successes = Vec::new();
    let report = runner
        .run_with_progress("echo hi", |r| successes.push((r.host, r.output)))
        .await
        .unwrap();

    assert_eq!(sink.contents(), "   ..done\n");
    assert_eq!(
        successes,
        vec![(a.clone(), b"hi\n".to_vec()), (b.clone(), b"hi\n".to_vec())]
    );
    assert!(report.connection_failed.is_empty());
    assert!(report.exit_failed.is_empty());
    assert!(report.is_success());
}

#[tokio::test]
#[serial]
async fn test_one_host_exits_nonzero() {
    let (a, b) = (node("a"), node("b"));
    let (runner, sink) = runner_with(
        vec![
            TransportEvent::chunk(&a, "ok\nexitcode=0\n"),
            TransportEvent::chunk(&b, "bad\nexitcode=1\n"),
        ],
        &[&a, &b],
    );

    let mut successes = Vec::new();
    let report = runner
        .run_with_progress("x", |r| successes.push(r.host))
        .await
        .unwrap();

    assert_eq!(successes, vec![a.clone()]);
    assert_eq!(report.exit_failed.len(), 1);
    assert_eq!(report.exit_failed[0].host, b);
    assert_eq!(report.exit_failed[0].exit_code, 1);
    assert_eq!(report.exit_failed[0].output, b"bad\n");
    assert_eq!(
        sink.contents(),
        "   .Fdone\n  failed to run successfully:\n    [root@b] exit 1 - bad\n"
    );
}

#[tokio::test]
#[serial]
async fn test_unreachable_host_is_connection_failure() {
    let (a, b, c) = (node("a"), node("b"), node("c"));
    let (runner, sink) = runner_with(
        vec![
            TransportEvent::chunk(&a, "exitcode=0\n"),
            TransportEvent::unreachable(&c, "Connection refused"),
            TransportEvent::chunk(&b, "exitcode=0\n"),
        ],
        &[&a, &b, &c],
    );

    let mut calls = 0;
    let report = runner.run_with_progress("x", |_| calls += 1).await.unwrap();

    assert_eq!(calls, 2);
    assert_eq!(report.connection_failed, vec![c]);
    assert!(report.exit_failed.is_empty());
    assert_eq!(report.succeeded, vec![a, b]);
    assert_eq!(
        sink.contents(),
        "   .F.done\n  failed to connect to nodes: root@c\n"
    );
}

#[tokio::test]
async fn test_capture_delivers_once_without_marker() {
    let a = node("a");
    let (runner, _) = runner_with(
        vec![
            TransportEvent::chunk(&a, "line1\n"),
            TransportEvent::chunk(&a, "line2\nexitcode=0\n"),
        ],
        &[&a],
    );

    let mut seen = Vec::new();
    runner.capture("cat", |r| seen.push(r)).await.unwrap();

    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].text(), "line1\nline2\n");
    assert_eq!(seen[0].exit_code, 0);
}

#[tokio::test]
async fn test_stream_delivers_each_chunk() {
    let a = node("a");
    let (runner, _) = runner_with(
        vec![
            TransportEvent::chunk(&a, "part1 "),
            TransportEvent::chunk(&a, "part2\n"),
            TransportEvent::chunk(&a, "exitcode=0\n"),
        ],
        &[&a],
    );

    let mut chunks = Vec::new();
    let report = runner
        .stream("x", |c| chunks.push((c.text().into_owned(), c.exit_code)))
        .await
        .unwrap();

    assert_eq!(
        chunks,
        vec![
            ("part1 ".to_string(), None),
            ("part2\n".to_string(), None),
            (String::new(), Some(0)),
        ]
    );
    assert_eq!(report.succeeded, vec![a]);
}

#[tokio::test]
async fn test_marker_split_across_chunks() {
    let a = node("a");
    let (runner, _) = runner_with(
        vec![
            TransportEvent::chunk(&a, "done\nexitco"),
            TransportEvent::chunk(&a, "de=4"),
            TransportEvent::chunk(&a, "2\n"),
        ],
        &[&a],
    );

    let mut seen = Vec::new();
    let report = runner.capture("x", |r| seen.push(r)).await.unwrap();

    assert_eq!(seen[0].exit_code, 42);
    assert_eq!(seen[0].output, b"done\n");
    assert_eq!(report.exit_failed[0].exit_code, 42);
}

#[tokio::test]
async fn test_first_marker_wins_and_trailer_is_not_output() {
    let a = node("a");
    let (runner, _) = runner_with(
        vec![TransportEvent::chunk(&a, "exitcode=3\nexitcode=0\n")],
        &[&a],
    );

    let report = runner.capture("x", |_| {}).await.unwrap();
    assert_eq!(report.exit_failed.len(), 1);
    assert_eq!(report.exit_failed[0].exit_code, 3);
    assert!(report.exit_failed[0].output.is_empty());
}

#[tokio::test]
async fn test_overflowing_exit_code_is_unknown() {
    let a = node("a");
    let (runner, _) = runner_with(
        vec![TransportEvent::chunk(&a, "exitcode=9999999999\n")],
        &[&a],
    );

    let report = runner.capture("x", |_| {}).await.unwrap();
    assert_eq!(report.exit_failed[0].exit_code, UNKNOWN_EXIT_CODE);
}

#[tokio::test]
async fn test_nonce_marker_ignores_plain_marker() {
    let a = node("a");
    let marker = ExitMarker::with_nonce();
    let script = format!("exitcode=0\n{}7\n", marker.prefix());
    let (runner, _) = runner_with(vec![TransportEvent::chunk(&a, script)], &[&a]);
    let runner = runner.with_marker(marker.clone());

    let report = runner.capture("x", |_| {}).await.unwrap();
    assert_eq!(report.exit_failed[0].exit_code, 7);
    assert_eq!(report.exit_failed[0].output, b"exitcode=0\n");
    assert!(runner.transport().dispatched()[0]
        .command
        .contains(marker.prefix()));
}

#[tokio::test]
#[serial]
async fn test_transport_failure_aborts_invocation() {
    let a = node("a");
    let transport = ScriptedTransport::new(vec![TransportEvent::chunk(&a, "exitcode=0\n")])
        .with_dispatch_failure("no route to any host");
    let sink = ProgressSink::memory();
    let runner = FleetRunner::new(transport, vec![a]).with_progress_sink(sink.clone());

    let err = runner.run_with_progress("x", |_| {}).await.unwrap_err();
    assert!(matches!(
        err,
        FleetError::Transport(TransportError::DispatchFailed { .. })
    ));
    assert!(!sink.contents().contains("done"));
    assert!(!behavior::is_overridden());
}

/// Records the ambient behavior seen while dispatching.
#[derive(Default)]
struct AmbientProbe {
    seen: Mutex<Vec<TransportBehavior>>,
}

#[async_trait]
impl Transport for AmbientProbe {
    async fn dispatch(
        &self,
        _command: &str,
        hosts: &[Node],
        _behavior: TransportBehavior,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        self.seen.lock().unwrap().push(behavior::current());
        for host in hosts {
            events
                .send(TransportEvent::chunk(host, "exitcode=0\n"))
                .await
                .map_err(|_| TransportError::ChannelClosed {
                    host: host.to_string(),
                })?;
        }
        Ok(())
    }
}

#[tokio::test]
#[serial]
async fn test_behavior_override_scoped_to_call() {
    let probe = Arc::new(AmbientProbe::default());
    let runner = FleetRunner::new(Arc::clone(&probe), vec![node("a")])
        .with_progress_sink(ProgressSink::Silent)
        .with_verbosity(0);

    assert!(!behavior::is_overridden());
    runner.run_with_progress("x", |_| {}).await.unwrap();
    assert!(!behavior::is_overridden());
    assert_eq!(behavior::current(), TransportBehavior::Standard);

    let verbose = FleetRunner::new(Arc::clone(&probe), vec![node("a")])
        .with_progress_sink(ProgressSink::Silent)
        .with_verbosity(2);
    verbose.run_with_progress("x", |_| {}).await.unwrap();

    assert_eq!(
        *probe.seen.lock().unwrap(),
        vec![TransportBehavior::SkipErrors, TransportBehavior::Standard]
    );
}

#[tokio::test]
async fn test_empty_host_list_is_an_error() {
    let runner = FleetRunner::new(ScriptedTransport::default(), Vec::new())
        .with_progress_sink(ProgressSink::Silent);
    assert!(matches!(
        runner.run_with_progress("x", |_| {}).await,
        Err(FleetError::NoHosts)
    ));
}
