// Copyright 2025 Chris Custine
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

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// Watch a live flight-sim radar feed and alert on airspace entries and exits
#[derive(Debug, Parser)]
#[command(name = "airspace-watch", version, about)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Address for the query API, e.g. 0.0.0.0:5000
    #[arg(long)]
    pub listen: Option<String>,

    /// Seconds between polls of the upstream feed
    #[arg(long)]
    pub interval: Option<u64>,

    /// Webhook receiving zone alerts
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(listen) = &self.listen {
            config.listen_address.clone_from(listen);
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(url) = &self.webhook_url {
            config.webhook_url = Some(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_file_values() {
        let cli = Cli::parse_from([
            "airspace-watch",
            "--listen",
            "0.0.0.0:8080",
            "--interval",
            "7",
            "--webhook-url",
            "https://discord.com/api/webhooks/1/abc",
        ]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.listen_address, "0.0.0.0:8080");
        assert_eq!(config.poll_interval_secs, 7);
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/abc")
        );
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let cli = Cli::parse_from(["airspace-watch", "-c", "/tmp/watch.toml"]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/watch.toml")));
        assert_eq!(config.listen_address, "127.0.0.1:5000");
        assert_eq!(config.poll_interval_secs, 2);
        assert!(!cli.print_config);
    }
}
