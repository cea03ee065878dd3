//! Health targets.

use crate::compose::{project_directory, ServiceDocument};
use crate::errors::{DocumentError, StackupError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// How a target is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthCheck {
    /// GET `url`; satisfied by a 2xx status.
    Http {
        /// Endpoint URL.
        url: String,
    },
    /// Satisfied when a TCP connection succeeds.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port.
        port: u16,
    },
    /// Runs a command; satisfied by exit code zero.
    Exec {
        /// Program and arguments.
        command: Vec<String>,
    },
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { url } => write!(f, "http {url}"),
            Self::Tcp { host, port } => write!(f, "tcp {host}:{port}"),
            Self::Exec { command } => write!(f, "exec {}", command.join(" ")),
        }
    }
}

/// A named readiness check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthTarget {
    /// Unique name, used as the report key.
    pub name: String,
    /// The check.
    #[serde(flatten)]
    pub check: HealthCheck,
}

impl HealthTarget {
    /// An HTTP target.
    #[must_use]
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: HealthCheck::Http { url: url.into() },
        }
    }

    /// A TCP target.
    #[must_use]
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            check: HealthCheck::Tcp {
                host: host.into(),
                port,
            },
        }
    }

    /// A command target.
    #[must_use]
    pub fn exec(name: impl Into<String>, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            check: HealthCheck::Exec {
                command: command.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Default targets for a composed document.
///
/// The primary service gets an HTTP `/health` check. A `redis` service gets
/// a TCP check on its first published host port and is skipped when it
/// publishes none. A `postgres` service gets a `pg_isready` exec check run
/// in the rendered project.
#[must_use]
pub fn default_targets(
    document: &ServiceDocument,
    app_service: &str,
    service_port: u16,
    compose_file: &Path,
) -> Vec<HealthTarget> {
    let mut targets = vec![HealthTarget::http(
        app_service,
        format!("http://localhost:{service_port}/health"),
    )];
    if let Some(port) = document.published_ports("redis").first() {
        targets.push(HealthTarget::tcp("redis", "localhost", *port));
    }
    if document.has_service("postgres") {
        let file = compose_file.to_string_lossy().into_owned();
        let project = project_directory(compose_file).to_string_lossy().into_owned();
        targets.push(HealthTarget::exec(
            "postgres",
            [
                "docker",
                "compose",
                "-f",
                file.as_str(),
                "--project-directory",
                project.as_str(),
                "exec",
                "-T",
                "postgres",
                "pg_isready",
            ],
        ));
    }
    targets
}

/// Reads an explicit target list from a JSON file.
///
/// # Errors
///
/// Returns `Document` if the file cannot be read, is not a JSON list of
/// targets, or names two targets alike.
pub fn load_targets(path: &Path) -> Result<Vec<HealthTarget>, StackupError> {
    let text = std::fs::read_to_string(path).map_err(|e| DocumentError::new(path, e.to_string()))?;
    let targets: Vec<HealthTarget> =
        serde_json::from_str(&text).map_err(|e| DocumentError::new(path, e.to_string()))?;
    let mut seen = HashSet::new();
    if let Some(target) = targets.iter().find(|t| !seen.insert(t.name.as_str())) {
        let reason = format!("duplicate target name '{}'", target.name);
        return Err(DocumentError::new(path, reason).into());
    }
    Ok(targets)
}
