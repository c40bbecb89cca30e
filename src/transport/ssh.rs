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

//! Transport backed by the system `ssh` client.
//!
//! Each host gets its own `ssh` process, run under a concurrency limit.
//! Stdout is forwarded chunk by chunk as it is read; stderr belongs to the
//! local client (the remote side already merges its stderr into stdout) and
//! is only used to explain connection failures.

use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tokio::sync::{mpsc, Semaphore};

use super::{Transport, TransportEvent};
use crate::error::TransportError;
use crate::executor::TransportBehavior;
use crate::node::Node;

/// Default SSH connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default number of hosts handled at once.
pub const DEFAULT_MAX_PARALLEL: usize = 10;

/// `ssh` reserves this exit status for its own errors.
const SSH_FAILURE_EXIT: i32 = 255;

/// Read buffer for command output; matches typical SSH channel window sizes.
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// Runs commands through `ssh` processes.
#[derive(Debug, Clone)]
pub struct SshTransport {
    program: String,
    leading_args: Vec<String>,
    max_parallel: usize,
    connect_timeout: u64,
    command_timeout: Option<Duration>,
    identity_file: Option<PathBuf>,
    ssh_options: Vec<String>,
}

impl SshTransport {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            program: "ssh".to_string(),
            leading_args: Vec::new(),
            max_parallel: max_parallel.max(1),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            command_timeout: None,
            identity_file: None,
            ssh_options: Vec::new(),
        }
    }

    /// Launch `program leading_args... <ssh arguments>` instead of `ssh`,
    /// e.g. `sshpass -e ssh`.
    pub fn with_program(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = seconds;
        self
    }

    /// Give up on a host after `timeout`; it is then reported unreachable.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_identity_file(mut self, identity_file: Option<PathBuf>) -> Self {
        self.identity_file = identity_file;
        self
    }

    /// Extra `-o` options, e.g. `StrictHostKeyChecking=yes`.
    pub fn with_ssh_options(mut self, options: Vec<String>) -> Self {
        self.ssh_options = options;
        self
    }

    /// Arguments passed to the program for one host.
    pub fn build_args(&self, node: &Node, command: &str, behavior: TransportBehavior) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
        ]);
        for option in &self.ssh_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
        }
        if !behavior.reports_host_errors() {
            args.push("-q".to_string());
        }
        args.extend([
            "-p".to_string(),
            node.port.to_string(),
            node.destination(),
            command.to_string(),
        ]);
        args
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn dispatch(
        &self,
        command: &str,
        hosts: &[Node],
        behavior: TransportBehavior,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        if hosts.is_empty() {
            return Err(TransportError::DispatchFailed {
                reason: "no hosts to dispatch to".to_string(),
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let tasks: Vec<_> = hosts
            .iter()
            .map(|node| {
                let node = node.clone();
                let program = self.program.clone();
                let args = self.build_args(&node, command, behavior);
                let timeout = self.command_timeout;
                let events = events.clone();
                let semaphore = Arc::clone(&semaphore);

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        TransportError::DispatchFailed {
                            reason: format!("semaphore acquisition failed: {e}"),
                        }
                    })?;
                    run_host(program, args, node, behavior, timeout, events).await
                })
            })
            .collect();

        let results = join_all(tasks).await;

        let mut first_error = None;
        for (node, result) in hosts.iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    tracing::error!("Task failed for node {}: {}", node, e);
                    send(&events, TransportEvent::unreachable(node, format!("task failed: {e}")))
                        .await?;
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn send(
    events: &mpsc::Sender<TransportEvent>,
    event: TransportEvent,
) -> Result<(), TransportError> {
    let host = event.host().to_string();
    events
        .send(event)
        .await
        .map_err(|_| TransportError::ChannelClosed { host })
}

async fn run_host(
    program: String,
    args: Vec<String>,
    node: Node,
    behavior: TransportBehavior,
    timeout: Option<Duration>,
    events: mpsc::Sender<TransportEvent>,
) -> Result<(), TransportError> {
    tracing::debug!("Dispatching to {} via {}", node, program);

    let mut child = match Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TransportError::Spawn { program, source: e });
        }
        Err(e) => {
            return send(&events, TransportEvent::unreachable(&node, e.to_string())).await;
        }
    };

    let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return send(&events, TransportEvent::unreachable(&node, "missing output pipes")).await;
    };

    let run = async {
        let collect_stderr = async {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::debug!("Failed to read ssh stderr for {}: {}", node, e);
            }
            buf
        };
        let (pumped, stderr) = tokio::join!(pump_stdout(stdout, &node, &events), collect_stderr);
        (pumped, stderr, child.wait().await)
    };

    let (pumped, stderr, status) = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(finished) => finished,
            Err(_) => {
                let reason = format!("command timed out after {}s", limit.as_secs());
                return send(&events, TransportEvent::unreachable(&node, reason)).await;
            }
        },
        None => run.await,
    };

    if let Err(e) = pumped {
        return send(&events, TransportEvent::unreachable(&node, e.to_string())).await;
    }

    let status = match status {
        Ok(status) => status,
        Err(e) => return send(&events, TransportEvent::unreachable(&node, e.to_string())).await,
    };

    match status.code() {
        Some(SSH_FAILURE_EXIT) => {
            let stderr = String::from_utf8_lossy(&stderr);
            let reason = stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("ssh exited with status 255")
                .to_string();
            if behavior.reports_host_errors() {
                tracing::warn!("ssh to {} failed: {}", node, stderr.trim());
            } else {
                tracing::debug!("ssh to {} failed: {}", node, reason);
            }
            send(&events, TransportEvent::unreachable(&node, reason)).await
        }
        Some(code) => {
            tracing::debug!("ssh for {} exited with {}", node, code);
            Ok(())
        }
        None => {
            send(&events, TransportEvent::unreachable(&node, "ssh terminated by signal")).await
        }
    }
}

async fn pump_stdout(
    mut stdout: ChildStdout,
    node: &Node,
    events: &mpsc::Sender<TransportEvent>,
) -> io::Result<()> {
    let mut buf = vec![0u8; SSH_CMD_BUFFER_SIZE];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if events
            .send(TransportEvent::chunk(node, &buf[..n]))
            .await
            .is_err()
        {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "event receiver dropped",
            ));
        }
    }
}
