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

//! Terminal capability detection.

use std::io::IsTerminal;

const CI_VARIABLES: &[&str] = &["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_URL", "TRAVIS"];

/// Check if stdout is an interactive terminal outside CI.
pub fn is_tty() -> bool {
    let is_ci = CI_VARIABLES.iter().any(|var| std::env::var(var).is_ok());
    std::io::stdout().is_terminal() && !is_ci
}

/// Check if colors should be enabled
///
/// Colors are enabled when:
/// - Output is a TTY
/// - NO_COLOR environment variable is not set
/// - TERM is not "dumb"
pub fn should_use_colors() -> bool {
    is_tty() && colors_allowed(std::env::var("NO_COLOR").ok(), std::env::var("TERM").ok())
}

fn colors_allowed(no_color: Option<String>, term: Option<String>) -> bool {
    no_color.is_none() && term.as_deref() != Some("dumb")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_allowed() {
        assert!(colors_allowed(None, Some("xterm-256color".to_string())));
        assert!(colors_allowed(None, None));
        assert!(!colors_allowed(Some("1".to_string()), None));
        assert!(!colors_allowed(None, Some("dumb".to_string())));
    }
}
