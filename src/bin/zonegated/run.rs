// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use zonegate::io::tokio::TokioIoProvider;
use zonegate::provider::InMemoryProvider;
use zonegate::serial::SerialStore;

use crate::args::RunArgs;
use crate::config;
use crate::zones;

/// The specific [`Server`](zonegate::server::Server) type we use.
pub type Server = zonegate::server::Server<InMemoryProvider>;

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Zonegate daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    info!(
        "Loading the configuration from {}.",
        run_args.config.display(),
    );
    let mut config = config::load_from_path(&run_args.config, false)
        .context("failed to load the configuration")?;
    if let Some(bind) = run_args.bind {
        config.bind = bind;
    }

    fs::create_dir_all(&config.serial_dir).with_context(|| {
        format!(
            "failed to create the serial directory {}",
            config.serial_dir.display(),
        )
    })?;

    // Create the runtime and bind before we load zones: zone loading
    // may be expensive, so it's better to fail fast.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create the Tokio runtime")?;
    let io_provider = runtime
        .block_on(TokioIoProvider::bind([config.bind]))
        .context("failed to bind sockets")?;

    // Load the views and zones.
    if config.zones.len() == 1 {
        info!("Beginning to load 1 zone.");
    } else {
        info!("Beginning to load {} zones.", config.zones.len());
    }
    let data = zones::load(&config).context("failed to load views and zones")?;
    let provider = InMemoryProvider::new(data.views, data.zones);
    let server = Arc::new(Server::new(
        provider,
        SerialStore::new(&config.serial_dir),
    ));

    // Set up signal handling.
    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    // Start the I/O provider.
    info!("Set-up is complete; starting the server.");
    let shutdown_controller = {
        let _guard = runtime.enter();
        io_provider.start(&server)
    };

    // Process incoming signals.
    for signal in signals.forever() {
        match signal {
            s @ (SIGINT | SIGTERM) => {
                let name = match s {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => unreachable!(),
                };
                info!("Received {}; shutting down.", name);
                break;
            }
            SIGHUP => {
                info!("Received SIGHUP; reloading views and zones.");
                if let Err(e) = reload_views_and_zones(&run_args.config, &server) {
                    let mut message = String::from("Failed to reload views and zones:");
                    for (i, cause) in e.chain().enumerate() {
                        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
                    }
                    error!("{}", message);
                }
            }
            _ => unreachable!(),
        }
    }

    // Shut down the server.
    shutdown_controller.blocking_shut_down();
    info!("Shutdown complete.");
    Ok(())
}

fn set_up_signal_handling() -> Result<Signals> {
    let all_signals = &[SIGHUP, SIGINT, SIGTERM];
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(all_signals).map_err(Into::into)
}

/// Reloads the configuration file and swaps the server's views and
/// zones. The bind address and serial directory are fixed at startup;
/// changes to them take effect on restart only.
fn reload_views_and_zones(config_path: &Path, server: &Server) -> Result<()> {
    let config = config::load_from_path(config_path, true)
        .context("failed to reload the configuration")?;
    let data = zones::load(&config).context("failed to reload views and zones")?;
    server.provider().replace(data.views, data.zones);
    Ok(())
}
