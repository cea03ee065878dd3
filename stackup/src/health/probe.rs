//! Probe implementations.

use super::HealthCheck;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Evaluates one check once.
///
/// Implementations never fail: any error means "not ready yet".
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns whether `check` is satisfied, giving up after `limit`.
    async fn probe(&self, check: &HealthCheck, limit: Duration) -> bool;
}

/// Probes over the network and the local process table.
#[derive(Debug, Clone, Default)]
pub struct SystemProber {
    client: reqwest::Client,
}

impl SystemProber {
    /// Creates a prober with a fresh HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(0)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn http(&self, url: &str, limit: Duration) -> bool {
        match self.client.get(url).timeout(limit).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "HTTP probe failed");
                false
            }
        }
    }

    async fn tcp(host: &str, port: u16, limit: Duration) -> bool {
        matches!(timeout(limit, TcpStream::connect((host, port))).await, Ok(Ok(_)))
    }

    async fn exec(command: &[String], limit: Duration) -> bool {
        let Some((program, args)) = command.split_first() else {
            return false;
        };
        let status = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        match timeout(limit, status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(program, error = %e, "Exec probe could not start");
                false
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Prober for SystemProber {
    async fn probe(&self, check: &HealthCheck, limit: Duration) -> bool {
        match check {
            HealthCheck::Http { url } => self.http(url, limit).await,
            HealthCheck::Tcp { host, port } => Self::tcp(host, *port, limit).await,
            HealthCheck::Exec { command } => Self::exec(command, limit).await,
        }
    }
}
