//! `stackup-entrypoint`: container entrypoint.
//!
//! Reads its configuration from the environment once, then execs the
//! detected service. If nothing is runnable it fails soft instead of
//! crash-looping the container.

use stackup::config::DispatchConfig;
use stackup::dispatch::{dispatch, fail_soft};
use stackup::observability::{init_tracing, LogFormat};
use std::process::ExitCode;
use tracing::error;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn main() -> ExitCode {
    let format = std::env::var("STACKUP_LOG_FORMAT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(LogFormat::Text);
    init_tracing(format);

    let config = DispatchConfig::from_env();
    let err = match dispatch(&config) {
        Ok(never) => match never {},
        Err(err) => err,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Cannot start the fail-soft runtime");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(async {
        tokio::select! {
            code = fail_soft(config.fail_soft, &err) => code,
            () = shutdown_signal() => 0,
        }
    });
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
