mod cli;
mod error_fmt;
mod hw;
mod logging;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use dispenser_config::Config;
use dispenser_core::error::DispenserError;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = real_main(cli) {
        tracing::debug!(error = %format!("{err:#}"), "command failed");
        if json_mode() {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

/// Read, parse and validate the config. Returns it with the directory that
/// relative paths inside it resolve against.
fn load_config(path: &Path) -> eyre::Result<(Config, PathBuf)> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = dispenser_config::load_toml(&text)
        .map_err(|e| DispenserError::Config(e.to_string()))
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .map_err(|e| DispenserError::Config(e.to_string()))?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((cfg, base))
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let (cfg, base) = load_config(&cli.config)?;
    logging::init(&cli.log_level, cli.json, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run { max_ticks } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;
            run::run(&cfg, &base, max_ticks, shutdown)?;
        }
        Commands::State => run::state(&cfg, &base)?,
        Commands::SetState { left, right } => {
            run::set_state(&cfg, &base, left, right)?;
        }
        Commands::SelfCheck => run::self_check(&cfg, &base)?,
    }
    Ok(())
}
