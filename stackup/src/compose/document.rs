//! Service-definition documents and the deep merge.

use crate::errors::DocumentError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// A parsed service-definition document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ServiceDocument(Value);

/// A host port a service publishes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    /// Service name.
    pub service: String,
    /// Published host port.
    pub host_port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: http://localhost:{}", self.service, self.host_port)
    }
}

impl ServiceDocument {
    /// Wraps an already-parsed value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parses YAML (or JSON) text. `origin` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError` if the text is not valid YAML or its top
    /// level is not a mapping.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, DocumentError> {
        let value: Value =
            serde_saphyr::from_str(text).map_err(|e| DocumentError::new(origin, e.to_string()))?;
        match value {
            Value::Object(_) => Ok(Self(value)),
            Value::Null => Ok(Self(Value::Object(Map::new()))),
            _ => Err(DocumentError::new(origin, "top level is not a mapping")),
        }
    }

    /// Reads and parses a document from disk.
    ///
    /// # Errors
    ///
    /// Returns `DocumentError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|e| DocumentError::new(path, e.to_string()))?;
        Self::parse(&text, path)
    }

    /// The underlying value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Deep-merges `overlay` into this document; overlay fields win.
    pub fn merge(&mut self, overlay: Self) {
        deep_merge(&mut self.0, overlay.0);
    }

    /// Service names in key order.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services()
            .map(|services| services.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Whether a service with this name is defined.
    #[must_use]
    pub fn has_service(&self, name: &str) -> bool {
        self.services().is_some_and(|services| services.contains_key(name))
    }

    /// Published host ports of every service, sorted.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = self
            .services()
            .into_iter()
            .flatten()
            .flat_map(|(service, definition)| {
                ports_of(definition).map(move |host_port| Endpoint {
                    service: service.clone(),
                    host_port,
                })
            })
            .collect();
        endpoints.sort();
        endpoints.dedup();
        endpoints
    }

    /// Host ports one service publishes, in declaration order.
    #[must_use]
    pub fn published_ports(&self, service: &str) -> Vec<u16> {
        self.services()
            .and_then(|services| services.get(service))
            .map(|definition| ports_of(definition).collect())
            .unwrap_or_default()
    }

    fn services(&self) -> Option<&Map<String, Value>> {
        self.0.get("services").and_then(Value::as_object)
    }
}

/// Merges `overlay` into `base` key by key. Objects merge recursively; any
/// other value replaces the base value whole.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn ports_of(definition: &Value) -> impl Iterator<Item = u16> + '_ {
    definition
        .get("ports")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(published_port)
}

/// Host port from one compose `ports` entry, if it publishes one.
fn published_port(entry: &Value) -> Option<u16> {
    match entry {
        Value::String(spec) => {
            let spec = spec.split('/').next()?;
            let mut parts: Vec<&str> = spec.rsplitn(3, ':').collect();
            parts.reverse();
            match parts.as_slice() {
                [_, host, _] | [host, _] => host.parse().ok(),
                _ => None,
            }
        }
        Value::Object(long) => match long.get("published")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        },
        _ => None,
    }
}
