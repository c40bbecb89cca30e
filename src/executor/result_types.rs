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

//! Per-host outcomes and the aggregate report of one invocation.

use owo_colors::OwoColorize;
use std::borrow::Cow;
use std::fmt::Write as _;

use crate::node::Node;

/// A host that ran the command to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResponse {
    pub host: Node,
    pub exit_code: i32,
    /// Merged stdout/stderr with the exit marker removed.
    pub output: Vec<u8>,
}

impl HostResponse {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// Terminal classification of one targeted host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The host could not be reached at all.
    ConnectionFailure { host: Node, reason: String },
    /// The command ran; `exit_code` may be non-zero.
    CommandResult(HostResponse),
}

impl Outcome {
    pub fn host(&self) -> &Node {
        match self {
            Outcome::ConnectionFailure { host, .. } => host,
            Outcome::CommandResult(response) => &response.host,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::CommandResult(response) if response.is_success())
    }
}

/// Every host of an invocation, grouped by outcome.
///
/// The three lists partition the targeted hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationReport {
    pub connection_failed: Vec<Node>,
    pub exit_failed: Vec<HostResponse>,
    pub succeeded: Vec<Node>,
}

impl InvocationReport {
    /// File one outcome under its category.
    ///
    /// Returns the response for successful hosts so the caller can act on it.
    pub fn record(&mut self, outcome: Outcome) -> Option<HostResponse> {
        match outcome {
            Outcome::ConnectionFailure { host, .. } => {
                self.connection_failed.push(host);
                None
            }
            Outcome::CommandResult(response) if response.is_success() => {
                self.succeeded.push(response.host.clone());
                Some(response)
            }
            Outcome::CommandResult(response) => {
                self.exit_failed.push(response);
                None
            }
        }
    }

    /// Order each category by host so reports are reproducible.
    pub fn sort(&mut self) {
        self.connection_failed.sort();
        self.exit_failed.sort_by(|a, b| a.host.cmp(&b.host));
        self.succeeded.sort();
    }

    pub fn is_success(&self) -> bool {
        self.connection_failed.is_empty() && self.exit_failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.connection_failed.len() + self.exit_failed.len() + self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.connection_failed.len() + self.exit_failed.len()
    }

    /// Whether `host` appears in any category.
    pub fn contains(&self, host: &Node) -> bool {
        self.connection_failed.contains(host)
            || self.succeeded.contains(host)
            || self.exit_failed.iter().any(|r| &r.host == host)
    }

    /// Human-readable failure summary; empty when everything succeeded.
    pub fn render(&self, use_colors: bool) -> String {
        let mut out = String::new();
        let failed = if use_colors {
            "failed".red().bold().to_string()
        } else {
            "failed".to_string()
        };

        if !self.connection_failed.is_empty() {
            let hosts: Vec<String> = self.connection_failed.iter().map(|h| h.to_string()).collect();
            let _ = writeln!(out, "  {failed} to connect to nodes: {}", hosts.join(" "));
        }

        if !self.exit_failed.is_empty() {
            let _ = writeln!(out, "  {failed} to run successfully:");
            for response in &self.exit_failed {
                let _ = writeln!(
                    out,
                    "    [{}] exit {} - {}",
                    response.host,
                    response.exit_code,
                    response.text().trim()
                );
            }
        }

        out
    }
}
