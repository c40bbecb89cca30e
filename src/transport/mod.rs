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

//! The remote-execution layer consumed by the executor.
//!
//! A [`Transport`] sends one command to many hosts and reports what happens
//! as a stream of [`TransportEvent`]s:
//!
//! - chunks for one host arrive in order, interleaved arbitrarily with
//!   other hosts' chunks;
//! - every targeted host eventually either delivers its exit marker or is
//!   reported [`TransportEvent::Unreachable`];
//! - a failure of the whole dispatch is returned as a [`TransportError`].

pub mod scripted;
pub mod ssh;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::executor::TransportBehavior;
use crate::node::Node;

pub use scripted::ScriptedTransport;
pub use ssh::SshTransport;

/// Capacity of the event channel between a transport and the executor.
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Something a transport observed for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw output; boundaries carry no meaning.
    Chunk { host: Node, data: Vec<u8> },
    /// The host could not be reached.
    Unreachable { host: Node, reason: String },
}

impl TransportEvent {
    pub fn chunk(host: &Node, data: impl AsRef<[u8]>) -> Self {
        TransportEvent::Chunk {
            host: host.clone(),
            data: data.as_ref().to_vec(),
        }
    }

    pub fn unreachable(host: &Node, reason: impl Into<String>) -> Self {
        TransportEvent::Unreachable {
            host: host.clone(),
            reason: reason.into(),
        }
    }

    pub fn host(&self) -> &Node {
        match self {
            TransportEvent::Chunk { host, .. } | TransportEvent::Unreachable { host, .. } => host,
        }
    }
}

/// Remote execution backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `command` on every host in `hosts`, sending events to `events`.
    ///
    /// Returns once every host has finished or failed. `behavior` is passed
    /// explicitly; implementations must not depend on the ambient override.
    async fn dispatch(
        &self,
        command: &str,
        hosts: &[Node],
        behavior: TransportBehavior,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn dispatch(
        &self,
        command: &str,
        hosts: &[Node],
        behavior: TransportBehavior,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        (**self).dispatch(command, hosts, behavior, events).await
    }
}
