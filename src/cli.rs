//! Command line interface for the `tricorder` agent binary.
//!
//! Every flag overrides the matching key from the configuration file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Capture backend selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CaptureArg {
    /// Capture from a network interface.
    Live,
    /// Replay a pcap file.
    File,
}

/// Command line arguments for the `tricorder` binary.
#[derive(Debug, Default, Parser)]
#[command(
    name = "tricorder",
    version,
    about = "Passive memcached latency capture agent"
)]
pub struct Cli {
    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port the control listener binds to.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to capture from.
    #[arg(short, long)]
    pub device: Option<String>,

    /// Capture backend.
    #[arg(long, value_enum)]
    pub capture_type: Option<CaptureArg>,

    /// Capture file to replay; implies `--capture-type file`.
    #[arg(long)]
    pub pcap: Option<PathBuf>,

    /// Memcached port to filter on.
    #[arg(long)]
    pub filter_port: Option<u16>,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{CaptureArg, Cli};

    #[test]
    fn parses_overrides() {
        let cli = Cli::parse_from([
            "tricorder",
            "--config",
            "agent.yml",
            "--port",
            "7000",
            "--device",
            "eth1",
            "--capture-type",
            "live",
        ]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("agent.yml")));
        assert_eq!(cli.port, Some(7000));
        assert_eq!(cli.device.as_deref(), Some("eth1"));
        assert_eq!(cli.capture_type, Some(CaptureArg::Live));
    }

    #[test]
    fn no_arguments_is_valid() {
        let cli = Cli::parse_from(["tricorder"]);
        assert!(cli.config.is_none());
        assert!(cli.pcap.is_none());
    }
}
