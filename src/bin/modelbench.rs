use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};
use modelbench::Workbench;
use modelbench::config::{ServiceSettings, default_settings_path};
use modelbench::server::shutdown_signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "modelbench", version, about = "Local workbench for comparing OpenAI-compatible models", long_about = None)]
struct Args {
    /// Override path to settings.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override listen address (host:port)
    #[arg(long, value_name = "ADDR:PORT")]
    listen: Option<String>,

    /// Directory holding config.json, questions.json and attachments
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Directory whose index.html is served at /
    #[arg(long, value_name = "PATH")]
    static_dir: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings_path = match &args.config {
        Some(path) => path.clone(),
        None => default_settings_path()?,
    };
    let mut settings = ServiceSettings::load_or_default(&settings_path)?;
    apply_overrides(&mut settings, &args);

    if let Err(err) = modelbench::telemetry::init_tracing("modelbench", args.verbose, &settings.logging)
    {
        eprintln!("warning: failed to initialise modelbench tracing: {err}");
    }
    if let Some(path) = modelbench::telemetry::current_log_file() {
        info!(path = %path.display(), "writing JSON log file");
    }
    info!(settings = %settings_path.display(), "loaded settings");

    let workbench = Workbench::from_settings(settings)?;
    workbench.serve(shutdown_signal()).await
}

fn apply_overrides(settings: &mut ServiceSettings, args: &Args) {
    if let Some(listen) = &args.listen {
        settings.listen_addr = listen.clone();
    }
    if let Some(dir) = &args.data_dir {
        settings.data_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.static_dir {
        settings.static_dir = Some(dir.clone());
    }
}
