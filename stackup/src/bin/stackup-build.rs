//! `stackup-build`: resolve a build variant, and optionally build it.
//!
//! Prints the resolved plan as JSON. With `--execute` it also runs the
//! selected stages and assembles the image root.

use anyhow::{bail, Context, Result};
use clap::Parser;
use stackup::config::BuildParams;
use stackup::events::LoggingEventSink;
use stackup::observability::{init_tracing, LogFormat};
use stackup::pipeline::{apply_copy_plan, default_stage_graph, resolve, BuildSettings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stackup-build", version, about = "Resolve and build an image variant")]
struct Cli {
    /// Runtime kind: interpreted, compiled, managed, browser-bundle
    #[arg(long, env = "STACKUP_RUNTIME")]
    runtime: Option<String>,
    /// Acceleration: cpu or gpu
    #[arg(long, env = "STACKUP_ACCELERATION")]
    acceleration: Option<String>,
    /// Component flag, e.g. `--component network=true` (repeatable)
    #[arg(long = "component", value_name = "NAME=BOOL")]
    components: Vec<String>,
    /// Application source tree
    #[arg(long, env = "STACKUP_SOURCE_ROOT")]
    source_root: Option<PathBuf>,
    /// Where stage artifacts are written
    #[arg(long, default_value = ".stackup/staging")]
    staging_root: PathBuf,
    /// Where the final image tree is assembled
    #[arg(long, default_value = ".stackup/image")]
    image_root: PathBuf,
    /// Per-stage timeout in seconds
    #[arg(long, value_name = "SECS")]
    stage_timeout: Option<u64>,
    /// Run the stages and assemble the image root
    #[arg(long)]
    execute: bool,
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn params(&self) -> Result<BuildParams> {
        let mut params = BuildParams::from_env();
        if let Some(runtime) = &self.runtime {
            params.runtime = Some(runtime.clone());
        }
        if let Some(acceleration) = &self.acceleration {
            params.acceleration = Some(acceleration.clone());
        }
        if let Some(root) = &self.source_root {
            params.source_root = Some(root.clone());
        }
        for flag in &self.components {
            let Some((name, value)) = flag.split_once('=') else {
                bail!("--component expects NAME=BOOL, got '{flag}'");
            };
            params
                .components
                .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        Ok(params)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.params()?.into_config()?;
    let graph = default_stage_graph()?.with_event_sink(Arc::new(LoggingEventSink::default()));
    let plan = resolve(&graph, &config)?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    if !cli.execute {
        return Ok(());
    }

    let mut settings = BuildSettings::new(&cli.staging_root, &config.source_root);
    if let Some(secs) = cli.stage_timeout {
        settings = settings.with_stage_timeout(Duration::from_secs(secs));
    }
    std::fs::create_dir_all(&settings.staging_root)
        .with_context(|| format!("cannot create {}", settings.staging_root.display()))?;

    let result = graph.execute(&plan.selected_stages(), &settings).await?;
    info!(stages = ?result.executed, duration_ms = result.duration_ms, "Stages finished");

    let written = apply_copy_plan(&plan, &settings.staging_root, &cli.image_root)?;
    info!(image_root = %cli.image_root.display(), copies = written.len(), "Image assembled");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Build failed");
            eprintln!("stackup-build: {e:#}");
            ExitCode::FAILURE
        }
    }
}
