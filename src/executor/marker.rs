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

//! Exit-status framing over the merged output stream.
//!
//! The remote command is wrapped so that, once it finishes, the shell prints
//! a marker line carrying `$?`:
//!
//! ```text
//! <command> 2>&1; echo "exitcode=$?" 2>&1
//! ```
//!
//! [`MarkerScanner`] consumes one host's output chunk by chunk, removes the
//! marker and yields the parsed exit code exactly once. Chunk boundaries never
//! line up with lines, so any tail that could still grow into a marker is
//! held back and rescanned together with the next chunk.

use uuid::Uuid;

/// Literal marker prefix used on the wire.
pub const DEFAULT_MARKER_PREFIX: &str = "exitcode=";

/// Exit code recorded when a host completed without a parsable marker.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Longer digit runs are treated as ordinary output.
const MAX_EXIT_DIGITS: usize = 10;

/// The marker a command is wrapped with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitMarker {
    prefix: String,
}

impl ExitMarker {
    /// Marker using the literal `exitcode=` prefix.
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_MARKER_PREFIX.to_string(),
        }
    }

    /// Marker with a random per-invocation suffix, e.g.
    /// `exitcode-3f2a...=`. Command output is practically never able to
    /// collide with it.
    pub fn with_nonce() -> Self {
        Self {
            prefix: format!("exitcode-{}=", Uuid::new_v4().simple()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wrap `command` so stderr is merged into stdout and the exit status
    /// is appended as a marker line.
    pub fn wrap(&self, command: &str) -> String {
        format!("{command} 2>&1; echo \"{}$?\" 2>&1", self.prefix)
    }

    /// Fresh scanner for one host.
    pub fn scanner(&self) -> MarkerScanner {
        MarkerScanner::new(self.prefix.as_bytes().to_vec())
    }
}

impl Default for ExitMarker {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a scanner is in its host's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Nothing is held back.
    Collecting,
    /// A possible marker start is held back until more bytes arrive.
    MarkerPending,
    /// The marker was seen (or the stream was finished); further input is ignored.
    Done,
}

/// Result of feeding one chunk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Output released by this chunk, marker removed.
    pub output: Vec<u8>,
    /// Set on the one chunk that completed the marker.
    pub exit_code: Option<i32>,
}

enum MarkerParse {
    Complete { code: i32, end: usize },
    Incomplete,
    NotAMarker,
}

/// Incremental marker parser for a single host.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    prefix: Vec<u8>,
    pending: Vec<u8>,
    state: ScanState,
}

impl MarkerScanner {
    fn new(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            pending: Vec::new(),
            state: ScanState::Collecting,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    /// Feed the next chunk of this host's output.
    pub fn feed(&mut self, chunk: &[u8]) -> Scan {
        if self.is_done() {
            tracing::trace!("Ignoring {} bytes after exit marker", chunk.len());
            return Scan::default();
        }

        self.pending.extend_from_slice(chunk);
        let mut output = Vec::with_capacity(self.pending.len());
        let mut search_from = 0;

        loop {
            let Some(at) = find(&self.pending[search_from..], &self.prefix).map(|i| i + search_from)
            else {
                // Hold back the longest tail that is still a prefix of the marker.
                let keep = partial_prefix_len(&self.pending[search_from..], &self.prefix);
                let split = self.pending.len() - keep;
                output.extend_from_slice(&self.pending[..split]);
                self.pending.drain(..split);
                self.state = if self.pending.is_empty() {
                    ScanState::Collecting
                } else {
                    ScanState::MarkerPending
                };
                return Scan {
                    output,
                    exit_code: None,
                };
            };

            match self.parse_marker(at + self.prefix.len()) {
                MarkerParse::Complete { code, end } => {
                    output.extend_from_slice(&self.pending[..at]);
                    let trailing = self.pending.len() - end;
                    if trailing > 0 {
                        tracing::trace!("Ignoring {} bytes after exit marker", trailing);
                    }
                    self.pending.clear();
                    self.state = ScanState::Done;
                    return Scan {
                        output,
                        exit_code: Some(code),
                    };
                }
                MarkerParse::Incomplete => {
                    output.extend_from_slice(&self.pending[..at]);
                    self.pending.drain(..at);
                    self.state = ScanState::MarkerPending;
                    return Scan {
                        output,
                        exit_code: None,
                    };
                }
                MarkerParse::NotAMarker => search_from = at + 1,
            }
        }
    }

    /// End of stream without a marker: release whatever was held back.
    pub fn finish(&mut self) -> Vec<u8> {
        if self.is_done() {
            return Vec::new();
        }
        self.state = ScanState::Done;
        std::mem::take(&mut self.pending)
    }

    fn parse_marker(&self, digits_at: usize) -> MarkerParse {
        let rest = &self.pending[digits_at..];
        let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > MAX_EXIT_DIGITS {
            return MarkerParse::NotAMarker;
        }

        let terminator_len = match (rest.get(digits), rest.get(digits + 1)) {
            (None, _) => return MarkerParse::Incomplete,
            (Some(b'\n'), _) if digits > 0 => 1,
            (Some(b'\r'), Some(b'\n')) if digits > 0 => 2,
            (Some(b'\r'), None) if digits > 0 => return MarkerParse::Incomplete,
            _ => return MarkerParse::NotAMarker,
        };

        // Digits are ASCII, so this cannot fail on encoding; only on overflow.
        let code = std::str::from_utf8(&rest[..digits])
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or_else(|| {
                tracing::warn!("Malformed exit marker value, treating as unknown");
                UNKNOWN_EXIT_CODE
            });

        MarkerParse::Complete {
            code,
            end: digits_at + digits + terminator_len,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn partial_prefix_len(buf: &[u8], prefix: &[u8]) -> usize {
    (1..prefix.len())
        .rev()
        .find(|&k| buf.ends_with(&prefix[..k]))
        .unwrap_or(0)
}
