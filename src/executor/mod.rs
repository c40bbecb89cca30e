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

//! Parallel command execution and result aggregation.
//!
//! Data flows from the [`Transport`](crate::transport::Transport) through
//! the marker scanner and the output accumulator to the progress reporter
//! and the caller's callbacks.

mod accumulator;
mod marker;
mod output_sync;
mod reporter;
mod result_types;
mod runner;

pub mod behavior;

pub use accumulator::{HostChunk, OutputAccumulator, OutputMode};
pub use behavior::{with_behavior, with_behavior_async, BehaviorOverride, TransportBehavior};
pub use marker::{ExitMarker, MarkerScanner, Scan, ScanState, DEFAULT_MARKER_PREFIX, UNKNOWN_EXIT_CODE};
pub use output_sync::{synchronized_print, synchronized_print_lines, NodeOutputWriter, ProgressSink};
pub use reporter::{ProgressReporter, FAILURE_GLYPH, SUCCESS_GLYPH};
pub use result_types::{HostResponse, InvocationReport, Outcome};
pub use runner::FleetRunner;
