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

//! Per-host output buffering.
//!
//! - Stream: every cleaned chunk is handed on immediately.
//! - Capture: cleaned chunks are buffered until the host's exit marker is
//!   seen, then handed on once as a whole.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::node::Node;

use super::marker::{ExitMarker, MarkerScanner};

/// How per-host output reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Deliver each chunk as it arrives.
    Stream,
    /// Deliver each host's full output once, together with its exit code.
    #[default]
    Capture,
}

impl OutputMode {
    pub fn is_stream(&self) -> bool {
        matches!(self, OutputMode::Stream)
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, OutputMode::Capture)
    }
}

/// Output handed to the caller for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostChunk {
    pub host: Node,
    /// Output with the exit marker removed.
    pub output: Vec<u8>,
    /// Present only on the chunk that carried the exit marker.
    pub exit_code: Option<i32>,
}

impl HostChunk {
    /// Lossy decoding of this chunk alone. A character split across chunks
    /// decodes as replacement characters; line-oriented consumers should
    /// buffer `output` bytes instead.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    /// Whether this is the last chunk for its host.
    pub fn is_final(&self) -> bool {
        self.exit_code.is_some()
    }
}

#[derive(Debug)]
struct HostBuffer {
    scanner: MarkerScanner,
    captured: Vec<u8>,
    bytes_received: usize,
}

impl HostBuffer {
    fn new(scanner: MarkerScanner) -> Self {
        Self {
            scanner,
            captured: Vec::new(),
            bytes_received: 0,
        }
    }
}

/// Demultiplexes interleaved chunks into per-host state.
#[derive(Debug)]
pub struct OutputAccumulator {
    mode: OutputMode,
    marker: ExitMarker,
    hosts: HashMap<Node, HostBuffer>,
}

impl OutputAccumulator {
    pub fn new(mode: OutputMode, marker: ExitMarker) -> Self {
        Self {
            mode,
            marker,
            hosts: HashMap::new(),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Feed one raw chunk for `host`.
    ///
    /// Returns what should be delivered now, if anything. Chunks arriving
    /// after the host's marker are dropped.
    pub fn feed(&mut self, host: &Node, chunk: &[u8]) -> Option<HostChunk> {
        let buffer = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| HostBuffer::new(self.marker.scanner()));

        if buffer.scanner.is_done() {
            tracing::debug!(
                "Dropping {} bytes from {} received after completion",
                chunk.len(),
                host
            );
            return None;
        }

        buffer.bytes_received += chunk.len();
        let scan = buffer.scanner.feed(chunk);

        match self.mode {
            OutputMode::Stream => {
                if scan.output.is_empty() && scan.exit_code.is_none() {
                    return None;
                }
                Some(HostChunk {
                    host: host.clone(),
                    output: scan.output,
                    exit_code: scan.exit_code,
                })
            }
            OutputMode::Capture => {
                buffer.captured.extend_from_slice(&scan.output);
                let exit_code = scan.exit_code?;
                tracing::trace!(
                    "{} completed after {} bytes",
                    host,
                    buffer.bytes_received
                );
                Some(HostChunk {
                    host: host.clone(),
                    output: std::mem::take(&mut buffer.captured),
                    exit_code: Some(exit_code),
                })
            }
        }
    }

    /// Whether the marker (or a forced close) has been seen for `host`.
    pub fn is_done(&self, host: &Node) -> bool {
        self.hosts
            .get(host)
            .is_some_and(|buffer| buffer.scanner.is_done())
    }

    /// Whether any chunk has been seen for `host`.
    pub fn has_seen(&self, host: &Node) -> bool {
        self.hosts.contains_key(host)
    }

    /// Close `host` without a marker, discarding anything buffered.
    pub fn discard(&mut self, host: &Node) {
        if let Some(buffer) = self.hosts.get_mut(host) {
            buffer.scanner.finish();
            buffer.captured.clear();
        }
    }

    /// Close every host that never produced a marker.
    ///
    /// Returns each such host with whatever output had not yet been
    /// delivered, sorted by host.
    pub fn drain_unfinished(&mut self) -> Vec<(Node, Vec<u8>)> {
        let mut unfinished: Vec<(Node, Vec<u8>)> = self
            .hosts
            .iter_mut()
            .filter(|(_, buffer)| !buffer.scanner.is_done())
            .map(|(host, buffer)| {
                let mut output = std::mem::take(&mut buffer.captured);
                output.extend(buffer.scanner.finish());
                (host.clone(), output)
            })
            .collect();
        unfinished.sort_by(|a, b| a.0.cmp(&b.0));
        unfinished
    }
}
