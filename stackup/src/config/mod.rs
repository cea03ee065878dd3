//! Process configuration.
//!
//! Every binary builds its configuration once at start-up, from flags and
//! the process environment, and passes it by value into the components.
//! Nothing reads the environment after that point.

mod build;
mod dispatch;

pub use build::{
    Acceleration, BuildConfig, BuildParams, Component, RuntimeKind, DEFAULT_SERVICE_PORT,
};
pub use dispatch::{DispatchConfig, FailSoftPolicy};

/// Parses a boolean parameter the way shell-driven build args spell them.
pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
