//! Status board: the console's read-only mirror of the hub's stores.
//!
//! The hub owns its stores on its own task, so the REPL thread cannot read
//! them directly. Listeners attached at startup copy each notification into a
//! shared [`Board`] which `/status` and `/params` print.

use std::sync::{Arc, Mutex};

use colored::Colorize;
use ugv_hub::Hub;
use ugv_types::{
    Battery, ControlCommand, HubError, LinkStatus, ParameterState, TelemetryValue, Topic,
};

#[derive(Debug, Clone, Default)]
pub struct Board {
    pub link: LinkStatus,
    pub battery: Option<Battery>,
    pub latency_ms: Option<f64>,
    pub position: Option<(f64, f64)>,
    pub command: ControlCommand,
    pub parameters: Option<ParameterState>,
}

pub type SharedBoard = Arc<Mutex<Board>>;

fn with_board(board: &SharedBoard, f: impl FnOnce(&mut Board)) -> Result<(), HubError> {
    let mut guard = board
        .lock()
        .map_err(|_| HubError::Listener("status board lock poisoned".into()))?;
    f(&mut guard);
    Ok(())
}

/// Subscribe the board to every store it mirrors.
pub fn attach(hub: &mut Hub, board: &SharedBoard) {
    let b = Arc::clone(board);
    hub.telemetry_mut()
        .subscribe(Topic::Status, move |value: &TelemetryValue| {
            match value {
                TelemetryValue::Status(status) => with_board(&b, |s| s.link = *status),
                _ => Ok(()),
            }
        });

    let b = Arc::clone(board);
    hub.telemetry_mut()
        .subscribe(Topic::Battery, move |value: &TelemetryValue| match value {
            TelemetryValue::Battery(battery) => with_board(&b, |s| s.battery = Some(*battery)),
            _ => Ok(()),
        });

    let b = Arc::clone(board);
    hub.telemetry_mut()
        .subscribe(Topic::Latency, move |value: &TelemetryValue| match value {
            TelemetryValue::Latency(ms) => with_board(&b, |s| s.latency_ms = Some(*ms)),
            _ => Ok(()),
        });

    let b = Arc::clone(board);
    hub.telemetry_mut()
        .subscribe(Topic::Odometry, move |value: &TelemetryValue| match value {
            TelemetryValue::Odometry(odo) => with_board(&b, |s| s.position = Some((odo.x, odo.y))),
            _ => Ok(()),
        });

    let b = Arc::clone(board);
    hub.control_mut()
        .subscribe(move |cmd: &ControlCommand| with_board(&b, |s| s.command = cmd.clone()));

    let b = Arc::clone(board);
    hub.parameters_mut().subscribe(move |state: &ParameterState| {
        with_board(&b, |s| s.parameters = Some(state.clone()))
    });
}

fn link_label(status: LinkStatus) -> colored::ColoredString {
    match status {
        LinkStatus::Connected => "CONNECTED".green().bold(),
        LinkStatus::Disconnected => "DISCONNECTED".yellow().bold(),
        LinkStatus::Error => "ERROR".red().bold(),
    }
}

pub fn print_status(board: &Board) {
    println!();
    println!("{}", "Vehicle Status".bold().underline());
    println!("  Link      : {}", link_label(board.link));
    match board.latency_ms {
        Some(ms) => println!("  Latency   : {:.1} ms", ms),
        None => println!("  Latency   : {}", "n/a".dimmed()),
    }
    match &board.battery {
        Some(b) => println!(
            "  Battery   : {:.1}% ({:.2} V, {:.2} A)",
            b.percentage, b.voltage, b.current
        ),
        None => println!("  Battery   : {}", "n/a".dimmed()),
    }
    if let Some((x, y)) = board.position {
        println!("  Position  : ({:.2}, {:.2}) m", x, y);
    }

    let cmd = &board.command;
    println!(
        "  Command   : linear {:+.2}  angular {:+.2}  via {}",
        cmd.linear, cmd.angular, cmd.active_input
    );
    if let Some(device) = &cmd.connected_device {
        println!("  Device    : {}", device.as_str().bold());
    }
    if cmd.e_stop {
        println!("  E-Stop    : {}", "ENGAGED".red().bold());
    } else {
        println!("  E-Stop    : {}", "released".green());
    }
    println!();
}

pub fn print_parameters(board: &Board) {
    let Some(state) = &board.parameters else {
        println!("  {}", "No parameter state received yet.".dimmed());
        return;
    };
    println!();
    println!("{}", "Parameters".bold().underline());
    for path in state.tree.paths() {
        let value = state.tree.get(&path).unwrap_or_default();
        match state.pending.get(&path) {
            Some(requested) => println!(
                "  {:<24} {:>8.3}  {} {:.3}",
                path.to_string(),
                value,
                "pending →".yellow(),
                requested
            ),
            None => println!("  {:<24} {:>8.3}", path.to_string(), value),
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ugv_hub::{HubConfig, HubEvent, HubHandle};
    use ugv_types::{CommandUpdate, InputSource, TelemetryUpdate};

    fn quiet_hub() -> (Hub, HubHandle) {
        let (handle, _events) = HubHandle::channel();
        let config = HubConfig {
            mock_telemetry: false,
            ..HubConfig::default()
        };
        (Hub::with_simulated_link(config, &handle), handle)
    }

    #[test]
    fn board_mirrors_commands_and_telemetry() {
        let (mut hub, _handle) = quiet_hub();
        let board = SharedBoard::default();
        attach(&mut hub, &board);

        let _ = hub.handle(HubEvent::Command(CommandUpdate::drive(
            0.4,
            -0.2,
            InputSource::Keyboard,
        )));
        let _ = hub.handle(HubEvent::Telemetry(TelemetryUpdate::new().latency(17.5)));

        let snapshot = board.lock().unwrap().clone();
        assert_eq!(snapshot.command.linear, 0.4);
        assert_eq!(snapshot.command.active_input, InputSource::Keyboard);
        assert_eq!(snapshot.latency_ms, Some(17.5));
        assert_eq!(snapshot.link, LinkStatus::Connected);
    }

    #[test]
    fn board_receives_initial_parameter_state() {
        let (mut hub, _handle) = quiet_hub();
        let board = SharedBoard::default();
        attach(&mut hub, &board);

        let state = board.lock().unwrap().parameters.clone().expect("replayed");
        assert!(state.pending.is_empty());
        assert_eq!(state.tree.get(&"pid.kp".parse().unwrap()), Some(1.2));
    }
}
