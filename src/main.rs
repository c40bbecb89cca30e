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

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

use fleetrun::{
    cli::{Cli, Commands},
    commands::{
        exec::{execute_command, stream_command},
        node_init::{check_initialized, make_dirs, mark_initialized},
    },
    config::{expand_tilde, Config},
    executor::{ExitMarker, FleetRunner},
    node::Node,
    transport::{ssh::DEFAULT_MAX_PARALLEL, SshTransport},
    utils::{init_logging, should_use_colors},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_with_priority(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if let Some(user) = &cli.user {
        config.defaults.user = Some(user.clone());
    }

    let nodes = resolve_nodes(&cli, &config)?;
    tracing::info!("Targeting {} nodes", nodes.len());

    let use_colors = should_use_colors();
    let runner = build_runner(&cli, &config, nodes, use_colors);

    let report = match &cli.command {
        Commands::Exec { command } => execute_command(&runner, &command.join(" ")).await?,
        Commands::Stream { command } => {
            stream_command(&runner, &command.join(" "), use_colors).await?
        }
        Commands::Mkdirs { dirs } => make_dirs(&runner, dirs).await?,
        Commands::CheckInit => check_initialized(&runner, &config.node_init).await?,
        Commands::MarkInit => mark_initialized(&runner, &config.node_init).await?,
    };

    if !report.is_success() {
        tracing::debug!(
            "{} of {} nodes failed",
            report.failed_count(),
            report.total()
        );
        std::process::exit(1);
    }

    Ok(())
}

fn resolve_nodes(cli: &Cli, config: &Config) -> Result<Vec<Node>> {
    match (&cli.hosts, &cli.cluster) {
        (Some(hosts), _) => config.parse_hosts(hosts),
        (None, Some(cluster)) => config.resolve_nodes(cluster),
        (None, None) => anyhow::bail!("No hosts specified. Use -H or -C to select target nodes."),
    }
}

fn build_runner(
    cli: &Cli,
    config: &Config,
    nodes: Vec<Node>,
    use_colors: bool,
) -> FleetRunner<SshTransport> {
    let defaults = &config.defaults;

    let parallel = cli
        .parallel
        .or_else(|| config.get_parallel(cli.cluster.as_deref()))
        .unwrap_or(DEFAULT_MAX_PARALLEL);

    let mut transport = SshTransport::new(parallel)
        .with_command_timeout(cli.timeout.or(defaults.command_timeout).map(Duration::from_secs))
        .with_identity_file(
            cli.identity
                .clone()
                .or_else(|| defaults.ssh_key.as_deref().map(|key| expand_tilde(Path::new(key)))),
        )
        .with_ssh_options(defaults.ssh_options.clone());
    if let Some(seconds) = cli.connect_timeout.or(defaults.connect_timeout) {
        transport = transport.with_connect_timeout(seconds);
    }

    let marker = if cli.unique_marker || defaults.unique_marker {
        ExitMarker::with_nonce()
    } else {
        ExitMarker::new()
    };

    FleetRunner::new(transport, nodes)
        .with_marker(marker)
        .with_verbosity(cli.verbose)
        .with_colors(use_colors)
}
