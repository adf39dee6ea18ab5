// src/main.rs

//! Operator tool for SpinelKV stores: opens the configured backend and checks
//! the consistency of the given lists without modifying them.

use anyhow::{Result, anyhow};
use spinelkv::Db;
use spinelkv::config::Config;
use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const USAGE: &str = "Usage: spinelkv [--config /path/to/config.toml] --verify <key> [<key> ...]";

/// Command-line options of the operator tool.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    version: bool,
    config_path: Option<String>,
    verify_keys: Vec<String>,
}

/// Parses the arguments after the program name. `--verify` takes every
/// following argument as a key up to the next `--` flag.
fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => cli.version = true,
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config flag requires a value"))?;
                cli.config_path = Some(path.clone());
            }
            "--verify" => {
                while let Some(key) = iter.next_if(|next| !next.starts_with("--")) {
                    cli.verify_keys.push(key.clone());
                }
            }
            other => return Err(anyhow!("unexpected argument '{other}'\n{USAGE}")),
        }
    }
    Ok(cli)
}

fn main() -> ExitCode {
    // Logging starts at RUST_LOG (or "info") so that configuration errors are
    // reported; the configured level is applied once the config is loaded.
    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    match run_app(&reload_handle) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(false)` if any verified list turned out inconsistent.
fn run_app<S>(reload_handle: &reload::Handle<EnvFilter, S>) -> Result<bool> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    if cli.version {
        println!("SpinelKV version {VERSION}");
        return Ok(true);
    }

    // Without --config the built-in defaults are used.
    let config = match &cli.config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if env::var("RUST_LOG").is_err() {
        reload_handle
            .reload(EnvFilter::new(&config.log_level))
            .map_err(|e| anyhow!("failed to apply log_level '{}': {e}", config.log_level))?;
    }

    if cli.verify_keys.is_empty() {
        eprintln!("{USAGE}");
        return Ok(true);
    }

    let db = Db::open(&config)?;
    info!(
        "Verifying {} list(s) on the {:?} backend",
        cli.verify_keys.len(),
        config.storage.backend
    );

    let mut all_consistent = true;
    for key in &cli.verify_keys {
        match db.lverify(key.as_bytes())? {
            None => println!("{key}: (absent)"),
            Some(report) if report.is_consistent() => {
                println!("{key}: ok ({} elements)", report.found);
            }
            Some(report) => {
                all_consistent = false;
                println!(
                    "{key}: INCONSISTENT (expected {}, found {}, missing positions {:?}, stray indices {:?})",
                    report.expected, report.found, report.missing, report.outside_window
                );
            }
        }
    }
    Ok(all_consistent)
}
