//! Build-time parameters consumed by the variant resolver.

use crate::errors::UnsupportedVariantError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default port of the primary service.
pub const DEFAULT_SERVICE_PORT: u16 = 8006;

/// The runtime the final image is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    /// Interpreted-language web service.
    Interpreted,
    /// Natively compiled service binary.
    Compiled,
    /// Managed-runtime (CLR) service.
    Managed,
    /// Browser bundle served by a JS runtime.
    BrowserBundle,
}

impl RuntimeKind {
    /// All runtime kinds.
    pub const ALL: [Self; 4] = [
        Self::Interpreted,
        Self::Compiled,
        Self::Managed,
        Self::BrowserBundle,
    ];

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interpreted => "interpreted",
            Self::Compiled => "compiled",
            Self::Managed => "managed",
            Self::BrowserBundle => "browser-bundle",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = UnsupportedVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpreted" => Ok(Self::Interpreted),
            "compiled" => Ok(Self::Compiled),
            "managed" => Ok(Self::Managed),
            "browser-bundle" | "browser_bundle" => Ok(Self::BrowserBundle),
            other => Err(UnsupportedVariantError::new(other, "unknown runtime kind")),
        }
    }
}

/// Hardware acceleration of the base image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceleration {
    /// CPU only.
    #[default]
    Cpu,
    /// CUDA-capable base.
    Gpu,
}

impl Acceleration {
    /// All acceleration kinds.
    pub const ALL: [Self; 2] = [Self::Cpu, Self::Gpu];

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Acceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acceleration {
    type Err = UnsupportedVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            other => Err(UnsupportedVariantError::new(other, "unknown acceleration kind")),
        }
    }
}

/// An optional compiled sub-component of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Network connector binaries.
    Network,
    /// Execution engine binaries.
    Execution,
}

impl Component {
    /// All optional components.
    pub const ALL: [Self; 2] = [Self::Network, Self::Execution];

    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Execution => "execution",
        }
    }

    /// Fixed in-image directory for this component's binaries.
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        PathBuf::from("/bin").join(self.as_str())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = UnsupportedVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" => Ok(Self::Network),
            "execution" => Ok(Self::Execution),
            other => Err(UnsupportedVariantError::new(other, "unknown component")),
        }
    }
}

/// Resolved build configuration.
///
/// Immutable once resolution begins; the resolver only borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Runtime of the base image.
    pub runtime_kind: RuntimeKind,
    /// CPU or GPU base.
    pub acceleration: Acceleration,
    /// Per-component enable flags. Missing components are disabled.
    #[serde(default)]
    pub component_flags: BTreeMap<Component, bool>,
    /// Image name.
    pub image_name: String,
    /// Image version tag.
    pub version: String,
    /// Port of the primary service.
    pub service_port: u16,
    /// Root of the application sources the real stages build from.
    pub source_root: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            runtime_kind: RuntimeKind::Interpreted,
            acceleration: Acceleration::Cpu,
            component_flags: BTreeMap::new(),
            image_name: "stackup-app".to_string(),
            version: "latest".to_string(),
            service_port: DEFAULT_SERVICE_PORT,
            source_root: PathBuf::from("."),
        }
    }
}

impl BuildConfig {
    /// Creates a config for a runtime/acceleration pair with every component disabled.
    #[must_use]
    pub fn new(runtime_kind: RuntimeKind, acceleration: Acceleration) -> Self {
        Self {
            runtime_kind,
            acceleration,
            ..Self::default()
        }
    }

    /// Sets a component flag.
    #[must_use]
    pub fn with_component(mut self, component: Component, enabled: bool) -> Self {
        self.component_flags.insert(component, enabled);
        self
    }

    /// Sets the source root.
    #[must_use]
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = root.into();
        self
    }

    /// Whether a component is enabled.
    #[must_use]
    pub fn is_enabled(&self, component: Component) -> bool {
        self.component_flags.get(&component).copied().unwrap_or(false)
    }

    /// Image reference (`name:version`).
    #[must_use]
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image_name, self.version)
    }
}

/// Raw, unparsed build parameters as they arrive from flags or build args.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    /// Raw runtime kind.
    pub runtime: Option<String>,
    /// Raw acceleration kind.
    pub acceleration: Option<String>,
    /// Raw component flags keyed by component name.
    pub components: BTreeMap<String, String>,
    /// Image name.
    pub image_name: Option<String>,
    /// Image version.
    pub version: Option<String>,
    /// Service port.
    pub service_port: Option<String>,
    /// Source root.
    pub source_root: Option<PathBuf>,
}

impl BuildParams {
    /// Reads `STACKUP_*` build parameters through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let components = Component::ALL
            .iter()
            .filter_map(|c| {
                let var = format!("STACKUP_COMPONENT_{}", c.as_str().to_ascii_uppercase());
                lookup(&var).map(|v| (c.as_str().to_string(), v))
            })
            .collect();

        Self {
            runtime: lookup("STACKUP_RUNTIME"),
            acceleration: lookup("STACKUP_ACCELERATION"),
            components,
            image_name: lookup("STACKUP_IMAGE_NAME"),
            version: lookup("STACKUP_VERSION"),
            service_port: lookup("SERVICE_PORT"),
            source_root: lookup("STACKUP_SOURCE_ROOT").map(PathBuf::from),
        }
    }

    /// Reads build parameters from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses the parameters, applying documented defaults for anything absent.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVariantError` for an unknown runtime, acceleration
    /// or component name, or an unparseable flag or port.
    pub fn into_config(self) -> Result<BuildConfig, UnsupportedVariantError> {
        let defaults = BuildConfig::default();

        let runtime_kind = match self.runtime.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => defaults.runtime_kind,
        };
        let acceleration = match self.acceleration.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => defaults.acceleration,
        };

        let mut component_flags = BTreeMap::new();
        for (name, raw) in &self.components {
            let component: Component = name.parse()?;
            let enabled = super::parse_flag(raw).ok_or_else(|| {
                UnsupportedVariantError::new(format!("{name}={raw}"), "component flag is not a boolean")
            })?;
            component_flags.insert(component, enabled);
        }

        let service_port = match self.service_port.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
                UnsupportedVariantError::new(format!("SERVICE_PORT={raw}"), "port is not a number")
            })?,
            _ => defaults.service_port,
        };

        Ok(BuildConfig {
            runtime_kind,
            acceleration,
            component_flags,
            image_name: self.image_name.unwrap_or(defaults.image_name),
            version: self.version.unwrap_or(defaults.version),
            service_port,
            source_root: self.source_root.unwrap_or(defaults.source_root),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = BuildParams::from_lookup(|_| None).into_config().unwrap();
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.runtime_kind, RuntimeKind::Interpreted);
        assert_eq!(config.acceleration, Acceleration::Cpu);
        assert!(!config.is_enabled(Component::Network));
        assert_eq!(config.service_port, 8006);
    }

    #[test]
    fn test_from_lookup() {
        let params = BuildParams::from_lookup(lookup(&[
            ("STACKUP_RUNTIME", "compiled"),
            ("STACKUP_ACCELERATION", "gpu"),
            ("STACKUP_COMPONENT_NETWORK", "true"),
            ("STACKUP_COMPONENT_EXECUTION", "0"),
            ("SERVICE_PORT", "9000"),
        ]));
        let config = params.into_config().unwrap();

        assert_eq!(config.runtime_kind, RuntimeKind::Compiled);
        assert_eq!(config.acceleration, Acceleration::Gpu);
        assert!(config.is_enabled(Component::Network));
        assert!(!config.is_enabled(Component::Execution));
        assert_eq!(config.service_port, 9000);
    }

    #[test]
    fn test_unknown_runtime_is_unsupported() {
        let params = BuildParams {
            runtime: Some("cobol".to_string()),
            ..BuildParams::default()
        };
        let err = params.into_config().unwrap_err();
        assert_eq!(err.key, "cobol");
        assert_eq!(err.error_info.code, "VARIANT-001-UNSUPPORTED");
    }

    #[test]
    fn test_bad_component_flag() {
        let mut params = BuildParams::default();
        params.components.insert("network".to_string(), "sometimes".to_string());
        assert!(params.into_config().is_err());
    }

    #[test]
    fn test_runtime_kind_roundtrip_names() {
        for kind in RuntimeKind::ALL {
            assert_eq!(kind.as_str().parse::<RuntimeKind>().unwrap(), kind);
        }
        assert_eq!(
            serde_json::to_string(&RuntimeKind::BrowserBundle).unwrap(),
            r#""browser-bundle""#
        );
    }

    #[test]
    fn test_component_destination() {
        assert_eq!(Component::Network.destination(), PathBuf::from("/bin/network"));
        assert_eq!(Component::Execution.destination(), PathBuf::from("/bin/execution"));
    }
}
