//! Container-start configuration for the runtime dispatcher.

use super::build::DEFAULT_SERVICE_PORT;
use std::path::PathBuf;
use std::time::Duration;

/// Directories searched for compiled component binaries in addition to `PATH`.
const COMPONENT_BIN_DIRS: [&str; 2] = ["/bin/network", "/bin/execution"];

/// What the dispatcher does when nothing is runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailSoftPolicy {
    /// Block forever so the container stays up and inspectable.
    #[default]
    BlockForever,
    /// Wait the given duration, then exit non-zero.
    ExitAfter(Duration),
}

/// Dispatcher configuration, read once from the environment at container start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Raw runtime kind. Kept as a string so unknown kinds can fail soft.
    pub runtime: String,
    /// Port the service must bind.
    pub service_port: u16,
    /// Verbatim command that bypasses detection.
    pub override_command: Option<String>,
    /// Entry module hint (`pkg.module` or `pkg.module:symbol`).
    pub module_hint: Option<String>,
    /// Application directory inside the image.
    pub app_dir: PathBuf,
    /// Executable search path.
    pub search_path: Vec<PathBuf>,
    /// Behavior when nothing is runnable.
    pub fail_soft: FailSoftPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            runtime: "interpreted".to_string(),
            service_port: DEFAULT_SERVICE_PORT,
            override_command: None,
            module_hint: None,
            app_dir: PathBuf::from("/app"),
            search_path: COMPONENT_BIN_DIRS.iter().map(PathBuf::from).collect(),
            fail_soft: FailSoftPolicy::BlockForever,
        }
    }
}

impl DispatchConfig {
    /// Reads the dispatcher configuration through `lookup`.
    ///
    /// Unparseable values fall back to their defaults with a warning rather
    /// than failing, since the dispatcher must never crash-loop a container.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let service_port = match non_empty("SERVICE_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "SERVICE_PORT is not a port number, using default");
                defaults.service_port
            }),
            None => defaults.service_port,
        };

        let mut search_path: Vec<PathBuf> = lookup("PATH")
            .map(|p| std::env::split_paths(&p).collect())
            .unwrap_or_default();
        search_path.extend(defaults.search_path);

        let fail_soft = match non_empty("STACKUP_DISPATCH_GIVE_UP_AFTER") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => FailSoftPolicy::ExitAfter(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(value = %raw, "STACKUP_DISPATCH_GIVE_UP_AFTER is not a number of seconds, blocking forever");
                    FailSoftPolicy::BlockForever
                }
            },
            None => FailSoftPolicy::BlockForever,
        };

        Self {
            runtime: non_empty("STACKUP_RUNTIME").unwrap_or(defaults.runtime),
            service_port,
            override_command: non_empty("STACKUP_OVERRIDE_CMD"),
            module_hint: non_empty("STACKUP_ENTRY_MODULE"),
            app_dir: non_empty("STACKUP_APP_DIR").map_or(defaults.app_dir, PathBuf::from),
            search_path,
            fail_soft,
        }
    }

    /// Reads the dispatcher configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Sets the application directory.
    #[must_use]
    pub fn with_app_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_dir = dir.into();
        self
    }

    /// Sets the runtime kind.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::from_lookup(|_| None);
        assert_eq!(config.runtime, "interpreted");
        assert_eq!(config.service_port, 8006);
        assert_eq!(config.app_dir, PathBuf::from("/app"));
        assert_eq!(config.fail_soft, FailSoftPolicy::BlockForever);
        assert!(config.search_path.contains(&PathBuf::from("/bin/network")));
    }

    #[test]
    fn test_bad_port_falls_back() {
        let config = DispatchConfig::from_lookup(|key| {
            (key == "SERVICE_PORT").then(|| "eighty".to_string())
        });
        assert_eq!(config.service_port, 8006);
    }

    #[test]
    fn test_give_up_after() {
        let config = DispatchConfig::from_lookup(|key| match key {
            "STACKUP_DISPATCH_GIVE_UP_AFTER" => Some("30".to_string()),
            "STACKUP_OVERRIDE_CMD" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.fail_soft, FailSoftPolicy::ExitAfter(Duration::from_secs(30)));
        assert!(config.override_command.is_none());
    }
}
