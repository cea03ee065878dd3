//! Runtime dispatcher: decides what the container runs at start.
//!
//! [`plan`] is pure over the configuration and the filesystem. Only
//! [`dispatch`] replaces the current process.

mod detect;

pub use detect::{
    find_entry_symbol, interpreted_entry, EntryPoint, Framework, COMPILED_BINARY, DEPS_DIR,
};

use crate::config::{DispatchConfig, FailSoftPolicy, RuntimeKind};
use crate::errors::NoRunnableTargetError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::process::Command;
use tracing::{error, info, warn};

/// Exit code used when the bounded fail-soft wait runs out.
pub const GIVE_UP_EXIT_CODE: i32 = 1;

/// How a launch target was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchSource {
    /// `STACKUP_OVERRIDE_CMD`, run verbatim.
    Override,
    /// A detected interpreted web entry point.
    InterpretedEntry,
    /// The compiled service binary.
    CompiledBinary,
    /// A managed-runtime assembly.
    ManagedAssembly,
    /// A browser-bundle server script.
    BrowserBundle,
}

/// A fully decided process launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    /// How the target was found.
    pub source: LaunchSource,
    /// Program to exec.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub workdir: PathBuf,
    /// Extra environment for the child.
    pub env: BTreeMap<String, String>,
}

impl LaunchPlan {
    pub(crate) fn new(
        source: LaunchSource,
        program: impl Into<String>,
        args: Vec<String>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            program: program.into(),
            args,
            workdir: workdir.into(),
            env: BTreeMap::new(),
        }
    }

    pub(crate) fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.insert(key.to_string(), value.into());
        self
    }

    fn with_port(mut self, port: u16) -> Self {
        self.env.insert("PORT".to_string(), port.to_string());
        self.env.insert("SERVICE_PORT".to_string(), port.to_string());
        self
    }

    /// The command line, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Builds the process command.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        if self.workdir.is_dir() {
            cmd.current_dir(&self.workdir);
        }
        cmd
    }
}

/// Decides what to launch.
///
/// # Errors
///
/// Returns `NoRunnableTargetError` when the runtime kind is unknown or no
/// detector finds a target.
pub fn plan(config: &DispatchConfig) -> Result<LaunchPlan, NoRunnableTargetError> {
    if let Some(command) = &config.override_command {
        let mut words = command.split_whitespace().map(str::to_string);
        if let Some(program) = words.next() {
            let plan = LaunchPlan::new(LaunchSource::Override, program, words.collect(), &config.app_dir);
            return Ok(plan.with_port(config.service_port));
        }
    }

    let kind: RuntimeKind = config.runtime.parse().map_err(|_| {
        NoRunnableTargetError::new(&config.runtime, "unknown runtime kind")
    })?;

    let detected = match kind {
        RuntimeKind::Interpreted => detect::interpreted(config),
        RuntimeKind::Compiled => detect::compiled(config),
        RuntimeKind::Managed => detect::managed(config),
        RuntimeKind::BrowserBundle => detect::browser_bundle(config),
    };

    detected
        .map(|plan| plan.with_port(config.service_port))
        .ok_or_else(|| {
            NoRunnableTargetError::new(
                kind.as_str(),
                format!("nothing runnable found under {}", config.app_dir.display()),
            )
        })
}

/// Plans and execs the launch target. Returns only on failure.
///
/// # Errors
///
/// Returns `NoRunnableTargetError` if nothing is runnable or the exec
/// itself fails.
pub fn dispatch(config: &DispatchConfig) -> Result<Infallible, NoRunnableTargetError> {
    let plan = plan(config)?;
    info!(source = ?plan.source, command = %plan.command_line(), port = config.service_port, "Launching service");
    let err = replace_process(&mut plan.command());
    Err(NoRunnableTargetError::new(
        &config.runtime,
        format!("cannot exec '{}': {err}", plan.program),
    ))
}

#[cfg(unix)]
fn replace_process(cmd: &mut Command) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    cmd.exec()
}

#[cfg(not(unix))]
fn replace_process(cmd: &mut Command) -> std::io::Error {
    match cmd.status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(GIVE_UP_EXIT_CODE)),
        Err(e) => e,
    }
}

/// Applies the fail-soft policy after `error`.
///
/// With [`FailSoftPolicy::BlockForever`] the returned future never
/// completes. Otherwise it resolves to the exit code once the wait is over.
pub async fn fail_soft(policy: FailSoftPolicy, error: &NoRunnableTargetError) -> i32 {
    error!(runtime = %error.runtime, reason = %error.reason, "No runnable target");
    match policy {
        FailSoftPolicy::BlockForever => {
            warn!("Blocking indefinitely; set STACKUP_DISPATCH_GIVE_UP_AFTER to exit instead");
            std::future::pending().await
        }
        FailSoftPolicy::ExitAfter(wait) => {
            warn!(wait_secs = wait.as_secs(), "Waiting before giving up");
            tokio::time::sleep(wait).await;
            GIVE_UP_EXIT_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config_in(dir: &std::path::Path, runtime: &str) -> DispatchConfig {
        DispatchConfig::default()
            .with_app_dir(dir)
            .with_runtime(runtime)
    }

    #[test]
    fn test_override_bypasses_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path(), "no-such-runtime");
        config.override_command = Some("python -m http.server  9000".to_string());

        let plan = plan(&config).unwrap();
        assert_eq!(plan.source, LaunchSource::Override);
        assert_eq!(plan.program, "python");
        assert_eq!(plan.args, vec!["-m", "http.server", "9000"]);
        assert_eq!(plan.env["PORT"], "8006");
    }

    #[test]
    fn test_interpreted_asgi_launch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "app = FastAPI()\n").unwrap();
        let mut config = config_in(dir.path(), "interpreted");
        config.service_port = 9100;

        let plan = plan(&config).unwrap();
        assert_eq!(plan.command_line(), "uvicorn main:app --host 0.0.0.0 --port 9100");
        assert_eq!(plan.env["SERVICE_PORT"], "9100");
    }

    #[test]
    fn test_interpreted_flask_launch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wsgi.py"), "site = Flask(__name__)\n").unwrap();

        let plan = plan(&config_in(dir.path(), "interpreted")).unwrap();
        assert_eq!(plan.command_line(), "gunicorn --bind 0.0.0.0:8006 wsgi:site");
    }

    #[test]
    fn test_unknown_runtime_is_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&config_in(dir.path(), "cobol")).unwrap_err();
        assert_eq!(err.runtime, "cobol");
        assert_eq!(err.error_info().code, "DISPATCH-001-NO_TARGET");
    }

    #[test]
    fn test_nothing_runnable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.py"), "x = 1\n").unwrap();
        assert!(plan(&config_in(dir.path(), "interpreted")).is_err());
    }

    #[tokio::test]
    async fn test_fail_soft_exit_after() {
        let err = NoRunnableTargetError::new("compiled", "nothing");
        let code = fail_soft(FailSoftPolicy::ExitAfter(Duration::from_millis(5)), &err).await;
        assert_eq!(code, GIVE_UP_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_fail_soft_blocks_forever() {
        let err = NoRunnableTargetError::new("compiled", "nothing");
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            fail_soft(FailSoftPolicy::BlockForever, &err),
        )
        .await;
        assert!(blocked.is_err());
    }
}
