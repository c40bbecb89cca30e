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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker file whose presence means a node has been initialized.
pub const DEFAULT_INITIALIZED_FILE: &str = "/var/lib/fleetrun/initialized";

/// Main configuration structure.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub clusters: HashMap<String, Cluster>,

    #[serde(default)]
    pub node_init: NodeInitConfig,
}

/// Global default settings.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    pub parallel: Option<usize>,
    /// SSH connection timeout in seconds.
    pub connect_timeout: Option<u64>,
    /// Per-host command timeout in seconds; unset means wait forever.
    pub command_timeout: Option<u64>,
    /// Use a random per-invocation exit marker.
    #[serde(default)]
    pub unique_marker: bool,
    /// Extra `-o` options for the ssh client.
    #[serde(default)]
    pub ssh_options: Vec<String>,
}

/// A named group of nodes.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Cluster {
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub parallel: Option<usize>,
}

/// Node entry: either `"[user@]host[:port]"` or a mapping.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum NodeConfig {
    Simple(String),
    Detailed {
        host: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        user: Option<String>,
    },
}

/// Settings for the `check-init` and `mark-init` commands.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeInitConfig {
    #[serde(default = "default_initialized_file")]
    pub initialized_file: String,

    /// Debian packages that must be installed on an initialized node.
    #[serde(default)]
    pub required_packages: Vec<String>,
}

impl Default for NodeInitConfig {
    fn default() -> Self {
        Self {
            initialized_file: default_initialized_file(),
            required_packages: Vec::new(),
        }
    }
}

fn default_initialized_file() -> String {
    DEFAULT_INITIALIZED_FILE.to_string()
}
