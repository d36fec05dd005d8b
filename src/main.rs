//! `tricorder` agent binary.
//!
//! Loads configuration, binds the control listener, and serves capture
//! sessions until interrupted.

mod cli;

use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use clap::Parser;
use log::{error, info};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tricorder::{
    AgentConfig,
    BackendFactory,
    ControlServer,
    SessionController,
    config::CaptureType,
};

use crate::cli::{CaptureArg, Cli};

/// Apply command line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut AgentConfig, cli: Cli) {
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(device) = cli.device {
        config.interface.device = device;
    }
    if let Some(capture) = cli.capture_type {
        config.interface.capture_type = match capture {
            CaptureArg::Live => CaptureType::Live,
            CaptureArg::File => CaptureType::File,
        };
    }
    if let Some(path) = cli.pcap {
        config.interface.path = Some(path);
        config.interface.capture_type = CaptureType::File;
    }
    if let Some(port) = cli.filter_port {
        config.filter.port = Some(port);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(feature = "metrics")]
fn install_metrics_exporter(config: &AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = config.metrics_port else {
        return Ok(());
    };
    let addr = SocketAddr::new(config.listen_address, port);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!("metrics exporter listening: addr={addr}");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics_exporter(config: &AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.metrics_port.is_some() {
        log::warn!("metrics_port ignored: built without the metrics feature");
    }
    Ok(())
}

async fn run(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    install_metrics_exporter(&config)?;

    let factory = Arc::new(BackendFactory::from_config(&config));
    let controller = Arc::new(SessionController::new(factory));
    let addr = SocketAddr::new(config.listen_address, config.port);
    let server = ControlServer::bind(addr, Arc::clone(&controller), config.mode.clone()).await?;
    info!(
        "agent ready: control={}, device={}, capture_type={:?}, filter_port={:?}",
        server.local_addr()?,
        config.interface.device,
        config.interface.capture_type,
        config.filter.port,
    );

    server
        .run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await;

    controller.stop().await?;
    info!("agent stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("tricorder: {err}");
            return ExitCode::FAILURE;
        }
    };
    apply_overrides(&mut config, cli);
    init_logging(&config.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("agent failed: error={err}");
            ExitCode::FAILURE
        }
    }
}
