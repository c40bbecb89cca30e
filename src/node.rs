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

//! Host identifiers.

use anyhow::{Context, Result};
use std::fmt;

use crate::config::get_current_username;

/// A remote machine targeted by a batch command.
///
/// Nodes are compared on all three fields, so `root@web1:22` and
/// `admin@web1:22` are distinct targets within one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl Node {
    pub fn new(host: String, port: u16, username: String) -> Self {
        Self {
            host,
            port,
            username,
        }
    }

    pub fn parse(node_str: &str, default_user: Option<&str>) -> Result<Self> {
        Self::parse_with_port(node_str, default_user, 22)
    }

    /// Parse `host`, `host:port`, `user@host` or `user@host:port`.
    pub fn parse_with_port(
        node_str: &str,
        default_user: Option<&str>,
        default_port: u16,
    ) -> Result<Self> {
        let node_str = node_str.trim();
        if node_str.is_empty() {
            anyhow::bail!("Empty host specification");
        }

        let (user_part, host_part) = match node_str.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, node_str),
        };

        let (host, port) = if let Some(colon_pos) = host_part.rfind(':') {
            let host = &host_part[..colon_pos];
            let port_str = &host_part[colon_pos + 1..];
            let port = port_str
                .parse::<u16>()
                .with_context(|| format!("Invalid port number in '{node_str}'"))?;
            (host, port)
        } else {
            (host_part, default_port)
        };

        if host.is_empty() {
            anyhow::bail!("Missing hostname in '{node_str}'");
        }

        let username = user_part
            .or(default_user)
            .map(|s| s.to_string())
            .unwrap_or_else(get_current_username);

        Ok(Node {
            host: host.to_string(),
            port,
            username,
        })
    }

    /// Destination string understood by the `ssh` client.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 22 {
            write!(f, "{}@{}", self.username, self.host)
        } else {
            write!(f, "{}@{}:{}", self.username, self.host, self.port)
        }
    }
}
