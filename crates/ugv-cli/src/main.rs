//! `ugv` – operator console for an unmanned ground vehicle.
//!
//! 1. Loads `~/.ugv/config.toml`, writing the defaults on first run.
//! 2. Starts the hub: telemetry, control arbitration and parameter sync on a
//!    single event loop, with the simulated sensor feed and config link.
//! 3. Drops the operator into a REPL that feeds drive, stop and parameter
//!    commands into the hub.
//! 4. Intercepts **Ctrl-C** to engage the emergency stop before exiting.

mod board;
mod config;
mod logging;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

use ugv_hub::{Hub, HubHandle};

fn main() {
    let _guard = logging::init_tracing("ugv-console");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let hub_config = match cfg.to_hub_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            println!("{}: {}", "Invalid configuration".red().bold(), e);
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            std::process::exit(1);
        }
    };

    let (handle, events) = HubHandle::channel();
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let ctrlc_handle = handle.clone();
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – engaging emergency stop …".yellow().bold());
        if ctrlc_handle.emergency_stop().is_ok() {
            println!("{}", "  ✓ Emergency stop sent to the hub.".green());
        }
        let _ = ctrlc_handle.shutdown();
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not engage the emergency stop");
    }

    let final_board = runtime.block_on(async {
        let mut hub = Hub::with_simulated_link(hub_config, &handle);

        let board = board::SharedBoard::default();
        board::attach(&mut hub, &board);

        // `/cmd_vel` frames go to the log until a vehicle link is attached.
        let (frames_tx, mut frames_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        hub.attach_command_bridge(frames_tx);
        tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                debug!(%frame, "cmd_vel");
            }
        });

        println!();
        println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

        let repl_board = Arc::clone(&board);
        let repl_shutdown = shutdown.clone();
        let repl_handle = handle.clone();
        if let Err(e) = std::thread::Builder::new()
            .name("ugv-repl".into())
            .spawn(move || repl::run(repl_handle, repl_board, repl_shutdown))
        {
            error!(error = %e, "failed to start the console thread");
            let _ = handle.shutdown();
        }

        let hub = hub.run(events).await;
        debug!(stopped = hub.control().is_stopped(), "hub returned");
        board.lock().map(|b| b.clone()).ok()
    });

    if let Some(b) = final_board {
        board::print_status(&b);
    }
    println!("{}", "  ✓ Hub stopped.".green());
}

fn first_run() -> config::Config {
    println!();
    println!("  No configuration found. Writing defaults.");
    match config::init() {
        Ok(cfg) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Error saving config".red(), e);
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __  __________    __"#.bold().cyan());
    println!("{}", r#"  / / / / ____/ |  / /"#.bold().cyan());
    println!("{}", r#" / / / / / __ | | / / "#.bold().cyan());
    println!("{}", r#"/ /_/ / /_/ / | |/ /  "#.bold().cyan());
    println!("{}", r#"\____/\____/  |___/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "UGV Console".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Telemetry, teleoperation and parameter tuning");
    println!();
}
