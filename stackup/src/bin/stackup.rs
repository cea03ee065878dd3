//! `stackup`: compose, launch and health-check a service set.
//!
//! Usage:
//!   stackup [--dev|--prod] [--gpu] [--no-build] [--wait SECS] [--retries N]
//!           [--interval SECS] [--follow] [SERVICES...]

use clap::Parser;
use stackup::cancellation::{listen_for_interrupt, CancellationToken};
use stackup::config::DEFAULT_SERVICE_PORT;
use stackup::events::LoggingEventSink;
use stackup::health::SystemProber;
use stackup::observability::{init_tracing, LogFormat};
use stackup::orchestrator::{
    DockerCompose, Orchestrator, OrchestratorConfig, EXIT_CONFIG_ERROR, EXIT_READY,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{raw}': {e}"))
}

#[derive(Parser, Debug)]
#[command(name = "stackup", version, about = "Compose, launch and health-check a service set")]
struct Cli {
    /// Apply the dev overlay
    #[arg(long, conflicts_with = "prod")]
    dev: bool,
    /// Apply the prod overlay
    #[arg(long)]
    prod: bool,
    /// Apply the gpu overlay
    #[arg(long)]
    gpu: bool,
    /// Skip building images
    #[arg(long)]
    no_build: bool,
    /// Seconds to wait after launch before probing
    #[arg(long, value_name = "SECS", default_value = "10", value_parser = parse_secs)]
    wait: Duration,
    /// Health check attempts
    #[arg(long, value_name = "N", default_value_t = 30)]
    retries: usize,
    /// Seconds between health check attempts
    #[arg(long, value_name = "SECS", default_value = "2", value_parser = parse_secs)]
    interval: Duration,
    /// Follow service logs after the summary
    #[arg(long)]
    follow: bool,
    /// Directory holding docker-compose*.yml
    #[arg(long, env = "STACKUP_OVERLAY_DIR", default_value = ".")]
    overlay_dir: PathBuf,
    /// Compose project name
    #[arg(long, env = "COMPOSE_PROJECT_NAME")]
    project_name: Option<String>,
    /// Primary service, checked over HTTP
    #[arg(long, default_value = "app")]
    app_service: String,
    /// Port of the primary service
    #[arg(long, env = "SERVICE_PORT", default_value_t = DEFAULT_SERVICE_PORT)]
    service_port: u16,
    /// JSON file with explicit health targets
    #[arg(long, value_name = "FILE")]
    targets: Option<PathBuf>,
    /// Per-probe timeout in seconds
    #[arg(long, value_name = "SECS", default_value = "5", value_parser = parse_secs)]
    probe_timeout: Duration,
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Services to launch (all when empty)
    services: Vec<String>,
}

impl Cli {
    fn into_config(self) -> OrchestratorConfig {
        OrchestratorConfig {
            overlays: OrchestratorConfig::select_overlays(self.dev, self.prod, self.gpu),
            overlay_dir: self.overlay_dir,
            build: !self.no_build,
            wait: self.wait,
            max_retries: self.retries,
            interval: self.interval,
            probe_timeout: self.probe_timeout,
            project_name: self.project_name,
            app_service: self.app_service,
            service_port: self.service_port,
            targets_file: self.targets,
            services: self.services,
            follow: self.follow,
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return exit_code(if e.use_stderr() { EXIT_CONFIG_ERROR } else { EXIT_READY });
        }
    };
    init_tracing(cli.log_format);

    let config = cli.into_config();
    let follow = config.follow;
    let cancel = CancellationToken::new();
    let _interrupts = listen_for_interrupt(cancel.clone());

    let runtime = DockerCompose::new().with_project_name(config.project_name.clone());
    let mut orchestrator = Orchestrator::new(config, Arc::new(runtime), Arc::new(SystemProber::new()))
        .with_cancellation(cancel.clone())
        .with_event_sink(Arc::new(LoggingEventSink::debug()));

    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Configuration error");
            eprintln!("stackup: {e}");
            if let Some(info) = e.error_info() {
                if let Some(hint) = info.fix_hint {
                    eprintln!("hint: {hint}");
                }
            }
            return exit_code(EXIT_CONFIG_ERROR);
        }
    };

    print!("{}", report.summary());

    if follow && !report.cancelled {
        if let Err(e) = orchestrator.follow_logs(&report).await {
            error!(error = %e, "Cannot follow logs");
        }
    }

    exit_code(report.exit_code())
}
