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

//! Node resolution and cluster management.

use anyhow::{Context, Result};

use crate::node::Node;

use super::types::{Cluster, Config, NodeConfig};
use super::utils::{expand_env_vars, get_current_username};

const DEFAULT_PORT: u16 = 22;

impl Config {
    /// Get a cluster by name.
    pub fn get_cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    /// Resolve nodes for a cluster.
    pub fn resolve_nodes(&self, cluster_name: &str) -> Result<Vec<Node>> {
        let cluster = self.get_cluster(cluster_name).ok_or_else(|| {
            let mut available: Vec<&str> = self.clusters.keys().map(String::as_str).collect();
            available.sort_unstable();
            anyhow::anyhow!(
                "Cluster '{}' not found in configuration.\nAvailable clusters: {}",
                cluster_name,
                available.join(", ")
            )
        })?;

        let default_user = cluster
            .user
            .as_ref()
            .or(self.defaults.user.as_ref())
            .map(|u| expand_env_vars(u));
        let default_port = cluster.port.or(self.defaults.port).unwrap_or(DEFAULT_PORT);

        cluster
            .nodes
            .iter()
            .map(|node_config| match node_config {
                NodeConfig::Simple(entry) => {
                    let entry = expand_env_vars(entry);
                    Node::parse_with_port(&entry, default_user.as_deref(), default_port)
                        .with_context(|| format!("Invalid node '{entry}' in cluster '{cluster_name}'"))
                }
                NodeConfig::Detailed { host, port, user } => {
                    let username = user
                        .as_ref()
                        .map(|u| expand_env_vars(u))
                        .or_else(|| default_user.clone())
                        .unwrap_or_else(get_current_username);
                    Ok(Node::new(
                        expand_env_vars(host),
                        port.unwrap_or(default_port),
                        username,
                    ))
                }
            })
            .collect()
    }

    /// Parse a comma-separated `-H` host list using the global defaults.
    pub fn parse_hosts(&self, hosts: &str) -> Result<Vec<Node>> {
        let default_port = self.defaults.port.unwrap_or(DEFAULT_PORT);
        hosts
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|h| Node::parse_with_port(h, self.defaults.user.as_deref(), default_port))
            .collect()
    }

    /// Get parallelism level, preferring the cluster's setting.
    pub fn get_parallel(&self, cluster_name: Option<&str>) -> Option<usize> {
        cluster_name
            .and_then(|name| self.get_cluster(name))
            .and_then(|cluster| cluster.parallel)
            .or(self.defaults.parallel)
    }
}
