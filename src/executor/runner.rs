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

//! Batch execution of one command across many hosts.
//!
//! [`FleetRunner`] wraps the command with the exit marker, hands it to a
//! [`Transport`], and turns the interleaved event stream into exactly one
//! [`Outcome`] per targeted host.

use std::collections::HashSet;
use tokio::sync::mpsc;

use crate::error::{FleetError, Result};
use crate::node::Node;
use crate::transport::{Transport, TransportEvent, EVENT_CHANNEL_CAPACITY};

use super::accumulator::{HostChunk, OutputAccumulator, OutputMode};
use super::behavior::{with_behavior_async, TransportBehavior};
use super::marker::{ExitMarker, UNKNOWN_EXIT_CODE};
use super::output_sync::ProgressSink;
use super::reporter::ProgressReporter;
use super::result_types::{HostResponse, InvocationReport, Outcome};

/// What the event loop hands to its caller.
enum Delivery {
    Chunk(HostChunk),
    Outcome(Outcome),
}

/// Runs commands on a fixed set of hosts through a transport.
pub struct FleetRunner<T> {
    transport: T,
    nodes: Vec<Node>,
    marker: ExitMarker,
    verbosity: u8,
    sink: ProgressSink,
    use_colors: bool,
}

impl<T: Transport> FleetRunner<T> {
    pub fn new(transport: T, nodes: Vec<Node>) -> Self {
        Self {
            transport,
            nodes,
            marker: ExitMarker::new(),
            verbosity: 0,
            sink: ProgressSink::Stdout,
            use_colors: false,
        }
    }

    pub fn with_marker(mut self, marker: ExitMarker) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Where progress glyphs and the summary go.
    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Behavior passed to the transport, derived from verbosity.
    pub fn behavior(&self) -> TransportBehavior {
        TransportBehavior::from_verbosity(self.verbosity)
    }

    /// Run `command`, handing every cleaned chunk to `on_chunk` as it
    /// arrives. The chunk carrying a host's exit code is its last one.
    ///
    /// Output is not retained, so `exit_failed` entries in the returned
    /// report have empty output.
    pub async fn stream<F>(&self, command: &str, mut on_chunk: F) -> Result<InvocationReport>
    where
        F: FnMut(HostChunk),
    {
        let mut report = InvocationReport::default();
        self.drive(command, OutputMode::Stream, self.behavior(), |delivery| match delivery {
            Delivery::Chunk(chunk) => on_chunk(chunk),
            Delivery::Outcome(outcome) => {
                report.record(outcome);
            }
        })
        .await?;
        report.sort();
        Ok(report)
    }

    /// Run `command`, handing each host's complete output to `on_result`
    /// once, whatever its exit code.
    pub async fn capture<F>(&self, command: &str, mut on_result: F) -> Result<InvocationReport>
    where
        F: FnMut(HostResponse),
    {
        let mut report = InvocationReport::default();
        self.drive(command, OutputMode::Capture, self.behavior(), |delivery| {
            if let Delivery::Outcome(outcome) = delivery {
                if let Outcome::CommandResult(response) = &outcome {
                    on_result(response.clone());
                }
                report.record(outcome);
            }
        })
        .await?;
        report.sort();
        Ok(report)
    }

    /// Run `command` with live progress glyphs and a final summary.
    ///
    /// `on_success` sees every host that exited 0. The behavior derived
    /// from verbosity is installed as the ambient override for the whole
    /// call.
    pub async fn run_with_progress<F>(
        &self,
        command: &str,
        mut on_success: F,
    ) -> Result<InvocationReport>
    where
        F: FnMut(HostResponse),
    {
        self.validate()?;
        let behavior = self.behavior();

        with_behavior_async(behavior, async {
            let mut reporter = ProgressReporter::new(self.sink.clone(), self.use_colors);
            reporter.begin();

            let driven = self
                .drive(command, OutputMode::Capture, behavior, |delivery| {
                    if let Delivery::Outcome(outcome) = delivery {
                        if let Some(response) = reporter.record(outcome) {
                            on_success(response);
                        }
                    }
                })
                .await;

            match driven {
                Ok(()) => Ok(reporter.finish()),
                Err(e) => {
                    reporter.abort();
                    Err(e)
                }
            }
        })
        .await
    }

    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(FleetError::NoHosts);
        }
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node) {
                return Err(FleetError::DuplicateHost {
                    host: node.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn drive<F>(
        &self,
        command: &str,
        mode: OutputMode,
        behavior: TransportBehavior,
        mut deliver: F,
    ) -> Result<()>
    where
        F: FnMut(Delivery),
    {
        self.validate()?;

        let wrapped = self.marker.wrap(command);
        let targeted: HashSet<&Node> = self.nodes.iter().collect();
        let mut accumulator = OutputAccumulator::new(mode, self.marker.clone());
        let mut terminated: HashSet<Node> = HashSet::with_capacity(self.nodes.len());

        tracing::debug!(
            "Dispatching to {} nodes ({:?}, {:?}): {}",
            self.nodes.len(),
            mode,
            behavior,
            command
        );

        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let dispatch = self.transport.dispatch(&wrapped, &self.nodes, behavior, tx);

        let consume = async {
            while let Some(event) = rx.recv().await {
                if !targeted.contains(event.host()) {
                    tracing::warn!("Ignoring event for untargeted host {}", event.host());
                    continue;
                }

                match event {
                    TransportEvent::Chunk { host, data } => {
                        if terminated.contains(&host) {
                            tracing::trace!("Ignoring late chunk from {}", host);
                            continue;
                        }
                        let Some(chunk) = accumulator.feed(&host, &data) else {
                            continue;
                        };
                        let Some(exit_code) = chunk.exit_code else {
                            deliver(Delivery::Chunk(chunk));
                            continue;
                        };

                        terminated.insert(host.clone());
                        let output = match mode {
                            OutputMode::Stream => {
                                deliver(Delivery::Chunk(chunk));
                                Vec::new()
                            }
                            OutputMode::Capture => chunk.output,
                        };
                        deliver(Delivery::Outcome(Outcome::CommandResult(HostResponse {
                            host,
                            exit_code,
                            output,
                        })));
                    }
                    TransportEvent::Unreachable { host, reason } => {
                        if terminated.contains(&host) {
                            tracing::debug!(
                                "Ignoring unreachable report for finished host {}: {}",
                                host,
                                reason
                            );
                            continue;
                        }
                        terminated.insert(host.clone());
                        accumulator.discard(&host);
                        deliver(Delivery::Outcome(Outcome::ConnectionFailure { host, reason }));
                    }
                }
            }
        };

        let (dispatched, ()) = tokio::join!(dispatch, consume);

        if let Err(e) = dispatched {
            tracing::error!("Dispatch failed: {}", e);
            return Err(e.into());
        }

        for (host, output) in accumulator.drain_unfinished() {
            if !terminated.insert(host.clone()) {
                continue;
            }
            tracing::warn!("{} finished without an exit marker", host);
            let output = match mode {
                OutputMode::Stream => {
                    deliver(Delivery::Chunk(HostChunk {
                        host: host.clone(),
                        output,
                        exit_code: Some(UNKNOWN_EXIT_CODE),
                    }));
                    Vec::new()
                }
                OutputMode::Capture => output,
            };
            deliver(Delivery::Outcome(Outcome::CommandResult(HostResponse {
                host,
                exit_code: UNKNOWN_EXIT_CODE,
                output,
            })));
        }

        for node in &self.nodes {
            if terminated.contains(node) {
                continue;
            }
            tracing::warn!("{} produced no output and was not reported unreachable", node);
            deliver(Delivery::Outcome(Outcome::CommandResult(HostResponse {
                host: node.clone(),
                exit_code: UNKNOWN_EXIT_CODE,
                output: Vec::new(),
            })));
        }

        Ok(())
    }
}
