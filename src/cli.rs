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

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "fleetrun",
    version,
    about = "Run one shell command across a fleet of hosts",
    long_about = "fleetrun runs a shell command on many hosts at once over ssh, recovers each host's exit status,\nprints one progress glyph per host as it finishes ('.' success, 'F' failure) and ends with a\nsummary of unreachable and failing hosts.",
    after_help = "EXAMPLES:\n  Run on hosts:              fleetrun -H \"web1,admin@web2:2222\" exec uptime\n  Run on a cluster:          fleetrun -C web exec \"df -h\"\n  Stream prefixed output:    fleetrun -C web stream \"tail -n 20 /var/log/syslog\"\n  Create directories:        fleetrun -C web mkdirs /srv/app /srv/app/logs\n  Check initialization:      fleetrun -C web check-init"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'H',
        long,
        help = "Comma-separated list of hosts in [user@]hostname[:port] format"
    )]
    pub hosts: Option<String>,

    #[arg(short = 'C', long, help = "Cluster name from configuration file")]
    pub cluster: Option<String>,

    #[arg(
        long,
        env = "FLEETRUN_CONFIG",
        help = "Configuration file path\nWithout it: ./fleetrun.yaml, then $XDG_CONFIG_HOME/fleetrun/config.yaml"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'u', long, help = "Default username for SSH connections")]
    pub user: Option<String>,

    #[arg(short = 'i', long, help = "SSH private key file path")]
    pub identity: Option<PathBuf>,

    #[arg(short = 'p', long, help = "Maximum parallel connections [default: 10]")]
    pub parallel: Option<usize>,

    #[arg(long, help = "SSH connection timeout in seconds [default: 10]")]
    pub connect_timeout: Option<u64>,

    #[arg(long, help = "Per-host command timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(
        long,
        help = "Use a random per-invocation exit marker instead of 'exitcode='"
    )]
    pub unique_marker: bool,

    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)\n-vv also reports per-host connection errors"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Run a command on every host with progress and summary")]
    Exec {
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true,
            help = "Command to execute"
        )]
        command: Vec<String>,
    },

    #[command(about = "Run a command and stream [host]-prefixed output as it arrives")]
    Stream {
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true,
            help = "Command to execute"
        )]
        command: Vec<String>,
    },

    #[command(about = "Create directories (mode 700) on every host")]
    Mkdirs {
        #[arg(required = true, help = "Directories to create")]
        dirs: Vec<String>,
    },

    #[command(about = "Verify every host has been initialized")]
    CheckInit,

    #[command(about = "Mark every host as initialized")]
    MarkInit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from(["fleetrun", "-H", "a,b", "-vv", "exec", "ls", "-la"]).unwrap();
        assert_eq!(cli.hosts.as_deref(), Some("a,b"));
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Commands::Exec {
                command: vec!["ls".to_string(), "-la".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_mkdirs_and_flags() {
        let cli = Cli::try_parse_from([
            "fleetrun",
            "-C",
            "web",
            "--parallel",
            "3",
            "--unique-marker",
            "mkdirs",
            "/srv/a",
            "/srv/b",
        ])
        .unwrap();
        assert_eq!(cli.cluster.as_deref(), Some("web"));
        assert_eq!(cli.parallel, Some(3));
        assert!(cli.unique_marker);
        assert!(matches!(cli.command, Commands::Mkdirs { ref dirs } if dirs.len() == 2));
    }

    #[test]
    fn test_exec_requires_command() {
        assert!(Cli::try_parse_from(["fleetrun", "exec"]).is_err());
    }
}
