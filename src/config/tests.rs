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

//! Configuration tests.

use serial_test::serial;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use super::types::{Config, NodeConfig, DEFAULT_INITIALIZED_FILE};
use super::utils::{expand_env_vars, expand_tilde};
use crate::node::Node;

const SAMPLE: &str = r#"
defaults:
  user: root
  port: 22
  parallel: 4
  connect_timeout: 5
  unique_marker: true
  ssh_options: ["StrictHostKeyChecking=yes"]
clusters:
  web:
    nodes:
      - web1
      - admin@web2:2222
      - host: web3
        port: 2200
    user: deploy
    parallel: 2
  db:
    nodes: [db1]
node_init:
  required_packages: [rsync, lsb-release]
"#;

#[test]
fn test_parse_sample() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.defaults.parallel, Some(4));
    assert!(config.defaults.unique_marker);
    assert_eq!(config.defaults.ssh_options, vec!["StrictHostKeyChecking=yes"]);
    assert_eq!(config.node_init.initialized_file, DEFAULT_INITIALIZED_FILE);
    assert_eq!(config.node_init.required_packages, vec!["rsync", "lsb-release"]);
    assert_eq!(
        config.clusters["web"].nodes[2],
        NodeConfig::Detailed {
            host: "web3".to_string(),
            port: Some(2200),
            user: None,
        }
    );
}

#[test]
fn test_resolve_nodes_applies_cluster_defaults() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let nodes = config.resolve_nodes("web").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::new("web1".to_string(), 22, "deploy".to_string()),
            Node::new("web2".to_string(), 2222, "admin".to_string()),
            Node::new("web3".to_string(), 2200, "deploy".to_string()),
        ]
    );

    let db = config.resolve_nodes("db").unwrap();
    assert_eq!(db, vec![Node::new("db1".to_string(), 22, "root".to_string())]);
}

#[test]
fn test_unknown_cluster_lists_available() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let err = config.resolve_nodes("cache").unwrap_err().to_string();
    assert!(err.contains("'cache' not found"));
    assert!(err.contains("db, web"));
}

#[test]
fn test_parse_hosts() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let nodes = config.parse_hosts("a, ops@b:2022,,").unwrap();
    assert_eq!(
        nodes,
        vec![
            Node::new("a".to_string(), 22, "root".to_string()),
            Node::new("b".to_string(), 2022, "ops".to_string()),
        ]
    );
    assert!(config.parse_hosts("a:notaport").is_err());
}

#[test]
fn test_get_parallel_prefers_cluster() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.get_parallel(Some("web")), Some(2));
    assert_eq!(config.get_parallel(Some("db")), Some(4));
    assert_eq!(config.get_parallel(None), Some(4));
}

#[test]
fn test_empty_yaml_is_default() {
    let config = Config::from_yaml("  \n").unwrap();
    assert!(config.clusters.is_empty());
    assert!(!config.defaults.unique_marker);
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = Config::load_with_priority(Some(file.path())).await.unwrap();
    assert_eq!(config.clusters.len(), 2);
}

#[tokio::test]
async fn test_explicit_missing_config_is_an_error() {
    let result = Config::load_with_priority(Some(Path::new("/nonexistent/fleetrun.yaml"))).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_yaml_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"clusters: [unclosed").unwrap();
    assert!(Config::load(file.path()).await.is_err());
}

#[test]
#[serial]
fn test_expand_env_vars() {
    std::env::set_var("FLEETRUN_TEST_VAR", "value");

    assert_eq!(expand_env_vars("a ${FLEETRUN_TEST_VAR}!"), "a value!");
    assert_eq!(expand_env_vars("$FLEETRUN_TEST_VAR@host"), "value@host");
    assert_eq!(expand_env_vars("${FLEETRUN_MISSING}"), "${FLEETRUN_MISSING}");
    assert_eq!(expand_env_vars("$FLEETRUN_MISSING"), "$FLEETRUN_MISSING");
    assert_eq!(expand_env_vars("cost: $5 or ${}"), "cost: $5 or ${}");
    assert_eq!(expand_env_vars("plain"), "plain");

    std::env::remove_var("FLEETRUN_TEST_VAR");
}

#[test]
#[serial]
fn test_expand_tilde() {
    let original_home = std::env::var("HOME").ok();
    std::env::set_var("HOME", "/home/user");

    assert_eq!(
        expand_tilde(Path::new("~/.config/fleetrun")),
        Path::new("/home/user/.config/fleetrun")
    );
    assert_eq!(expand_tilde(Path::new("/etc/fleetrun")), Path::new("/etc/fleetrun"));

    match original_home {
        Some(home) => std::env::set_var("HOME", home),
        None => std::env::remove_var("HOME"),
    }
}
