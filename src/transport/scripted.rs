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

//! A transport that replays a fixed event script.
//!
//! Useful for dry runs and for exercising the executor without network
//! access. Scripts speak the default `exitcode=` marker.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use super::{Transport, TransportEvent};
use crate::error::TransportError;
use crate::executor::TransportBehavior;
use crate::node::Node;

/// One recorded call to [`ScriptedTransport::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub command: String,
    pub hosts: Vec<Node>,
    pub behavior: TransportBehavior,
}

/// Replays `events` in order on every dispatch.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    events: Vec<TransportEvent>,
    failure: Option<String>,
    dispatched: Mutex<Vec<DispatchRecord>>,
}

impl ScriptedTransport {
    pub fn new(events: Vec<TransportEvent>) -> Self {
        Self {
            events,
            failure: None,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// Fail every dispatch with `reason` after replaying the script.
    pub fn with_dispatch_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Every dispatch seen so far.
    pub fn dispatched(&self) -> Vec<DispatchRecord> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn dispatch(
        &self,
        command: &str,
        hosts: &[Node],
        behavior: TransportBehavior,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DispatchRecord {
                command: command.to_string(),
                hosts: hosts.to_vec(),
                behavior,
            });

        for event in &self.events {
            let host = event.host().to_string();
            events
                .send(event.clone())
                .await
                .map_err(|_| TransportError::ChannelClosed { host })?;
        }

        match &self.failure {
            Some(reason) => Err(TransportError::DispatchFailed {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}
