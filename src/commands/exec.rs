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

use anyhow::Result;
use std::collections::HashMap;

use crate::executor::{
    synchronized_print, FleetRunner, HostChunk, HostResponse, InvocationReport, NodeOutputWriter,
};
use crate::node::Node;
use crate::transport::Transport;

/// Run `command` with progress glyphs, then print each successful host's
/// output as `[host] line`.
pub async fn execute_command<T: Transport>(
    runner: &FleetRunner<T>,
    command: &str,
) -> Result<InvocationReport> {
    let mut successes: Vec<HostResponse> = Vec::new();
    let report = runner
        .run_with_progress(command, |response| successes.push(response))
        .await?;

    successes.sort_by(|a, b| a.host.cmp(&b.host));
    for response in &successes {
        let mut writer = NodeOutputWriter::new(&response.host.to_string());
        writer.write_stdout(&response.output)?;
        writer.finish_stdout()?;
    }

    Ok(report)
}

/// Run `command`, printing `[host]`-prefixed lines as they arrive.
pub async fn stream_command<T: Transport>(
    runner: &FleetRunner<T>,
    command: &str,
    use_colors: bool,
) -> Result<InvocationReport> {
    let mut writers: HashMap<Node, NodeOutputWriter> = HashMap::new();

    let report = runner
        .stream(command, |chunk| write_chunk(&mut writers, chunk))
        .await?;

    for writer in writers.values_mut() {
        if let Err(e) = writer.finish_stdout() {
            tracing::error!("Failed to write output: {}", e);
        }
    }

    let summary = report.render(use_colors);
    if !summary.is_empty() {
        synchronized_print(&summary)?;
    }

    Ok(report)
}

fn write_chunk(writers: &mut HashMap<Node, NodeOutputWriter>, chunk: HostChunk) {
    let writer = writers
        .entry(chunk.host.clone())
        .or_insert_with(|| NodeOutputWriter::new(&chunk.host.to_string()));

    let mut result = writer.write_stdout(&chunk.output);
    if result.is_ok() && chunk.is_final() {
        result = writer.finish_stdout();
    }
    if let Err(e) = result {
        tracing::error!("Failed to write output for {}: {}", chunk.host, e);
    }
}
