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

//! Node preparation helpers: directory creation and initialization checks.

use anyhow::Result;

use crate::config::NodeInitConfig;
use crate::error::FleetError;
use crate::executor::{FleetRunner, InvocationReport};
use crate::transport::Transport;

/// Build one shell command creating every directory with mode 700.
///
/// Names containing a single quote or a space are rejected.
pub fn mkdirs_command<S: AsRef<str>>(dirs: &[S]) -> Result<String, FleetError> {
    let mut command = String::new();
    for dir in dirs {
        let dir = dir.as_ref();
        if dir.contains('\'') || dir.contains(' ') {
            return Err(FleetError::IllegalDirectory {
                name: dir.to_string(),
            });
        }
        command.push_str(&format!("mkdir -m 700 -p {dir}; "));
    }
    Ok(command)
}

/// Command that prints `ok` only on an initialized node.
pub fn check_init_command(config: &NodeInitConfig) -> String {
    let file = shell_quote(&config.initialized_file);
    if config.required_packages.is_empty() {
        return format!("test -f {file} && echo ok");
    }
    let packages: Vec<String> = config.required_packages.iter().map(|p| shell_quote(p)).collect();
    format!(
        "test -f {file} && ! dpkg-query -W --showformat='${{Status}}\\n' {} 2>&1 | grep -q -E '(deinstall|no packages)' && echo ok",
        packages.join(" ")
    )
}

pub fn mark_init_command(config: &NodeInitConfig) -> String {
    format!("touch {}", shell_quote(&config.initialized_file))
}

fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Create `dirs` on every node.
pub async fn make_dirs<T: Transport>(
    runner: &FleetRunner<T>,
    dirs: &[String],
) -> Result<InvocationReport> {
    let command = mkdirs_command(dirs)?;
    Ok(runner.run_with_progress(&command, |_| {}).await?)
}

/// Fail with [`FleetError::NotInitialized`] unless every node passes the
/// initialization check.
pub async fn check_initialized<T: Transport>(
    runner: &FleetRunner<T>,
    config: &NodeInitConfig,
) -> Result<InvocationReport> {
    let command = check_init_command(config);
    let report = runner.run_with_progress(&command, |_| {}).await?;

    if report.is_success() {
        return Ok(report);
    }

    let mut hosts: Vec<String> = report
        .connection_failed
        .iter()
        .chain(report.exit_failed.iter().map(|r| &r.host))
        .map(|node| node.to_string())
        .collect();
    hosts.sort();
    for host in &hosts {
        tracing::warn!("node not initialized: {}", host);
    }
    Err(FleetError::NotInitialized { hosts }.into())
}

/// Touch the initialization marker file on every node.
pub async fn mark_initialized<T: Transport>(
    runner: &FleetRunner<T>,
    config: &NodeInitConfig,
) -> Result<InvocationReport> {
    let command = mark_init_command(config);
    Ok(runner.run_with_progress(&command, |_| {}).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ProgressSink;
    use crate::node::Node;
    use crate::transport::{ScriptedTransport, TransportEvent};
    use serial_test::serial;

    fn node(name: &str) -> Node {
        Node::new(name.to_string(), 22, "root".to_string())
    }

    #[test]
    fn test_mkdirs_command() {
        assert_eq!(
            mkdirs_command(&["/srv/app", "/srv/app/logs"]).unwrap(),
            "mkdir -m 700 -p /srv/app; mkdir -m 700 -p /srv/app/logs; "
        );
    }

    #[test]
    fn test_mkdirs_rejects_quotes_and_spaces() {
        assert!(matches!(
            mkdirs_command(&["/srv/it's"]),
            Err(FleetError::IllegalDirectory { name }) if name == "/srv/it's"
        ));
        assert!(mkdirs_command(&["/srv/a b"]).is_err());
    }

    #[test]
    fn test_check_init_command() {
        let config = NodeInitConfig {
            initialized_file: "/var/lib/fleetrun/initialized".to_string(),
            required_packages: vec!["rsync".to_string(), "lsb-release".to_string()],
        };
        assert_eq!(
            check_init_command(&config),
            "test -f /var/lib/fleetrun/initialized && ! dpkg-query -W --showformat='${Status}\\n' rsync lsb-release 2>&1 | grep -q -E '(deinstall|no packages)' && echo ok"
        );

        let bare = NodeInitConfig::default();
        assert_eq!(
            check_init_command(&bare),
            "test -f /var/lib/fleetrun/initialized && echo ok"
        );
    }

    #[test]
    fn test_mark_init_quotes_odd_paths() {
        let config = NodeInitConfig {
            initialized_file: "/tmp/my marker".to_string(),
            required_packages: Vec::new(),
        };
        assert_eq!(mark_init_command(&config), "touch '/tmp/my marker'");
    }

    #[tokio::test]
    async fn test_illegal_directory_is_rejected_before_dispatch() {
        let runner = FleetRunner::new(ScriptedTransport::default(), vec![node("a")])
            .with_progress_sink(ProgressSink::Silent);
        let err = make_dirs(&runner, &["bad dir".to_string()]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FleetError>(),
            Some(FleetError::IllegalDirectory { .. })
        ));
        assert!(runner.transport().dispatched().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_check_initialized_lists_failing_nodes() {
        let (a, b, c) = (node("a"), node("b"), node("c"));
        let transport = ScriptedTransport::new(vec![
            TransportEvent::chunk(&a, "ok\nexitcode=0\n"),
            TransportEvent::chunk(&b, "exitcode=1\n"),
            TransportEvent::unreachable(&c, "timeout"),
        ]);
        let runner = FleetRunner::new(transport, vec![a, b, c])
            .with_progress_sink(ProgressSink::Silent);

        let err = check_initialized(&runner, &NodeInitConfig::default())
            .await
            .unwrap_err();
        match err.downcast_ref::<FleetError>() {
            Some(FleetError::NotInitialized { hosts }) => {
                assert_eq!(hosts, &vec!["root@b".to_string(), "root@c".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
