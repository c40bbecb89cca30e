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

//! Error types for batch execution.
//!
//! Per-host failures (unreachable hosts, non-zero exits, corrupted exit
//! markers) are never errors: they are recorded in the
//! [`InvocationReport`](crate::executor::InvocationReport). Only failures
//! that stop the whole batch surface here.

use thiserror::Error;

/// Failure of the transport layer as a whole, as opposed to one host.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not start any session at all.
    #[error("failed to dispatch command: {reason}")]
    DispatchFailed { reason: String },

    /// The local transport program could not be launched.
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The event consumer went away before the transport finished.
    #[error("event channel closed while dispatching to {host}")]
    ChannelClosed { host: String },
}

/// Errors returned by [`FleetRunner`](crate::executor::FleetRunner) and the
/// helpers built on it.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Nothing to dispatch to.
    #[error("no hosts to run on")]
    NoHosts,

    /// The same host was targeted twice in one invocation.
    #[error("host '{host}' is targeted more than once")]
    DuplicateHost { host: String },

    /// Transport-wide failure; aborts the whole invocation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Directory names may not contain quotes or spaces.
    #[error("illegal dir name '{name}'")]
    IllegalDirectory { name: String },

    /// One or more hosts failed the initialization check.
    #[error("{} node(s) not initialized: {}", .hosts.len(), .hosts.join(" "))]
    NotInitialized { hosts: Vec<String> },
}

pub type Result<T> = std::result::Result<T, FleetError>;
