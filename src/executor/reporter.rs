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

//! Live progress glyphs and the final summary.
//!
//! One glyph is printed per host as soon as its outcome is known, so the
//! glyph order follows completion order. The summary printed at the end is
//! grouped by category and sorted by host.

use owo_colors::OwoColorize;
use std::fmt::Write as _;

use crate::node::Node;

use super::behavior;
use super::output_sync::ProgressSink;
use super::result_types::{HostResponse, InvocationReport, Outcome};

pub const SUCCESS_GLYPH: &str = ".";
pub const FAILURE_GLYPH: &str = "F";

/// Indentation printed before the first glyph.
const PROGRESS_INDENT: &str = "   ";

/// Classifies outcomes while drawing progress.
pub struct ProgressReporter {
    sink: ProgressSink,
    use_colors: bool,
    report: InvocationReport,
    connection_errors: Vec<(Node, String)>,
}

impl ProgressReporter {
    pub fn new(sink: ProgressSink, use_colors: bool) -> Self {
        Self {
            sink,
            use_colors,
            report: InvocationReport::default(),
            connection_errors: Vec::new(),
        }
    }

    pub fn begin(&self) {
        self.emit(PROGRESS_INDENT);
    }

    /// Record a terminal outcome and draw its glyph.
    ///
    /// Returns the response when the host succeeded.
    pub fn record(&mut self, outcome: Outcome) -> Option<HostResponse> {
        let verbose = behavior::current().reports_host_errors();

        match &outcome {
            Outcome::ConnectionFailure { host, reason } => {
                if verbose {
                    tracing::warn!("Failed to connect to {}: {}", host, reason);
                } else {
                    tracing::debug!("Failed to connect to {}: {}", host, reason);
                }
                self.connection_errors.push((host.clone(), reason.clone()));
            }
            Outcome::CommandResult(response) if !response.is_success() => {
                if verbose {
                    tracing::info!("{} exited with {}", response.host, response.exit_code);
                }
            }
            Outcome::CommandResult(response) => {
                tracing::debug!("{} succeeded", response.host);
            }
        }

        let glyph = match (outcome.is_success(), self.use_colors) {
            (true, true) => SUCCESS_GLYPH.green().to_string(),
            (true, false) => SUCCESS_GLYPH.to_string(),
            (false, true) => FAILURE_GLYPH.red().to_string(),
            (false, false) => FAILURE_GLYPH.to_string(),
        };
        self.emit(&glyph);

        self.report.record(outcome)
    }

    /// Terminate the progress line, print the summary and hand back the report.
    pub fn finish(mut self) -> InvocationReport {
        self.emit("done\n");
        self.report.sort();

        let mut summary = self.report.render(self.use_colors);
        if behavior::current().reports_host_errors() && !self.connection_errors.is_empty() {
            self.connection_errors.sort();
            let _ = writeln!(summary, "  connection errors:");
            for (host, reason) in &self.connection_errors {
                let _ = writeln!(summary, "    [{host}] {reason}");
            }
        }
        if !summary.is_empty() {
            self.emit(&summary);
        }

        self.report
    }

    /// Terminate the progress line after a batch-wide failure.
    pub fn abort(self) {
        self.emit("\n");
    }

    fn emit(&self, text: &str) {
        if let Err(e) = self.sink.write(text) {
            tracing::error!("Failed to write progress output: {}", e);
        }
    }
}
