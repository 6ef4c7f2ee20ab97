//! CLI smoke entry point.
//!
//! # Responsibility
//! - Load configuration, start logging and open the configured backend.
//! - Print a deterministic health summary for local sanity checks.

use conduit_core::{open_repository, CoreConfig, Context, Service};
use log::info;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("conduit_cli error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = CoreConfig::from_env().map_err(|err| format!("invalid configuration: {err}"))?;
    let logging = conduit_core::init_from_config(&config)?;

    let repo = open_repository(&config).map_err(|err| err.to_string())?;
    let service = Service::new(repo, config);
    let tags = service
        .articles()
        .list_tags(&Context::background())
        .map_err(|err| err.to_string())?;
    info!(
        "event=cli_health module=cli status=ok backend={:?} tags={}",
        service.config().backend,
        tags.len()
    );

    println!("conduit_core ping={}", conduit_core::ping());
    println!("conduit_core version={}", conduit_core::core_version());
    println!("backend={:?}", service.config().backend);
    println!("logging={}", if logging { "file" } else { "off" });
    println!("tags={}", tags.len());
    Ok(())
}
