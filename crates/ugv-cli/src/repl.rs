//! REPL – operator console for the hub.
//!
//! Supported slash-commands:
//!   /help                  – show this list
//!   /status                – link, battery, command and e-stop state
//!   /params                – parameter tree with pending writes
//!   /set <group.key> <v>   – request a parameter write
//!   /drive <lin> <ang>     – keyboard drive command, both in [-1, 1]
//!   /joy <dx> <dy>         – drag the virtual joystick handle
//!   /pad <a0> <a1> ...     – feed one gamepad axis sample
//!   /release               – zero the drive command
//!   /connect <id>          – report a gamepad connected
//!   /disconnect <id>       – report a gamepad disconnected
//!   /stop                  – toggle the emergency stop (the stop key)
//!   /estop | /clear        – engage / release the emergency stop
//!   /quit | /exit          – shut the hub down and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ugv_hub::{AxisSample, HubEvent, HubHandle, VirtualJoystick};
use ugv_types::{CommandUpdate, DeviceId, InputSource, ParamPath};

use crate::board::{self, SharedBoard};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Status,
    Params,
    Set { path: ParamPath, value: f64 },
    Drive { linear: f32, angular: f32 },
    Joystick { dx: f32, dy: f32 },
    Pad(AxisSample),
    Release,
    Connect(DeviceId),
    Disconnect(DeviceId),
    ToggleStop,
    EmergencyStop,
    ClearStop,
    Quit,
}

fn number<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T, String> {
    let raw = arg.ok_or_else(|| format!("missing {what}"))?;
    raw.parse()
        .map_err(|_| format!("'{raw}' is not a valid {what}"))
}

fn no_more<'a>(mut rest: impl Iterator<Item = &'a str>) -> Result<(), String> {
    match rest.next() {
        Some(extra) => Err(format!("unexpected argument '{extra}'")),
        None => Ok(()),
    }
}

/// Parse one line of input.
pub fn parse(line: &str) -> Result<ReplCommand, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".into());
    };

    let cmd = match head {
        "/help" => ReplCommand::Help,
        "/status" => ReplCommand::Status,
        "/params" => ReplCommand::Params,
        "/set" => {
            let path = words
                .next()
                .ok_or("missing parameter path")?
                .parse::<ParamPath>()
                .map_err(|e| e.to_string())?;
            let value: f64 = number(words.next(), "value")?;
            if !value.is_finite() {
                return Err("value must be finite".into());
            }
            ReplCommand::Set { path, value }
        }
        "/drive" => ReplCommand::Drive {
            linear: number(words.next(), "linear")?,
            angular: number(words.next(), "angular")?,
        },
        "/joy" => ReplCommand::Joystick {
            dx: number(words.next(), "dx")?,
            dy: number(words.next(), "dy")?,
        },
        "/pad" => {
            let axes = words
                .by_ref()
                .map(|w| number::<f32>(Some(w), "axis"))
                .collect::<Result<Vec<_>, _>>()?;
            if axes.is_empty() {
                return Err("missing axis values".into());
            }
            ReplCommand::Pad(AxisSample::new(axes))
        }
        "/release" => ReplCommand::Release,
        "/connect" => ReplCommand::Connect(DeviceId::new(
            words.next().ok_or("missing device id")?,
        )),
        "/disconnect" => ReplCommand::Disconnect(DeviceId::new(
            words.next().ok_or("missing device id")?,
        )),
        "/stop" => ReplCommand::ToggleStop,
        "/estop" => ReplCommand::EmergencyStop,
        "/clear" => ReplCommand::ClearStop,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    no_more(words)?;
    Ok(cmd)
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
/// However the loop ends (`/quit`, EOF, a read error, the hub going away)
/// the hub is asked to shut down.
pub fn run(handle: HubHandle, board: SharedBoard, shutdown: Arc<AtomicBool>) {
    run_with(io::stdin().lock(), handle, board, shutdown);
}

fn run_with(
    mut input: impl BufRead,
    handle: HubHandle,
    board: SharedBoard,
    shutdown: Arc<AtomicBool>,
) {
    let mut stdout = io::stdout();
    let joystick = VirtualJoystick::default();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "ugv>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cmd = match parse(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    e.yellow(),
                    "/help".bold()
                );
                continue;
            }
        };

        let event = match cmd {
            ReplCommand::Help => {
                cmd_help();
                continue;
            }
            ReplCommand::Status => {
                show(&board, board::print_status);
                continue;
            }
            ReplCommand::Params => {
                show(&board, board::print_parameters);
                continue;
            }
            ReplCommand::Set { path, value } => HubEvent::WriteParam { path, value },
            ReplCommand::Drive { linear, angular } => HubEvent::Command(CommandUpdate::drive(
                linear,
                angular,
                InputSource::Keyboard,
            )),
            ReplCommand::Joystick { dx, dy } => HubEvent::Command(joystick.drag(dx, dy)),
            ReplCommand::Pad(sample) => HubEvent::Gamepad(sample),
            ReplCommand::Release => HubEvent::Command(joystick.release()),
            ReplCommand::Connect(id) => HubEvent::DeviceConnected(id),
            ReplCommand::Disconnect(id) => HubEvent::DeviceDisconnected(id),
            ReplCommand::ToggleStop => HubEvent::ToggleEmergencyStop,
            ReplCommand::EmergencyStop => HubEvent::EmergencyStop,
            ReplCommand::ClearStop => HubEvent::ClearEmergencyStop,
            ReplCommand::Quit => {
                println!("{}", "Goodbye.".green());
                break;
            }
        };

        if let Err(e) = handle.send(event) {
            println!("{}: {}", "Hub unavailable".red(), e);
            break;
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    let _ = handle.shutdown();
}

fn show(board: &SharedBoard, print: fn(&board::Board)) {
    match board.lock() {
        Ok(b) => print(&b),
        Err(_) => println!("{}", "Status board unavailable.".red()),
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Operator Commands".bold().underline());
    println!("  {}              – link, battery, command, e-stop", "/status".bold().cyan());
    println!("  {}              – parameter tree and pending writes", "/params".bold().cyan());
    println!("  {} – request a parameter write", "/set <group.key> <v>".bold().cyan());
    println!("  {}   – drive, both values in [-1, 1]", "/drive <lin> <ang>".bold().cyan());
    println!("  {}        – drag the virtual joystick", "/joy <dx> <dy>".bold().cyan());
    println!("  {}     – one gamepad axis sample", "/pad <a0> <a1> ..".bold().cyan());
    println!("  {}             – zero the drive command", "/release".bold().cyan());
    println!("  {}   – gamepad attached / detached", "/connect  /disconnect".bold().cyan());
    println!("  {}                – toggle the emergency stop", "/stop".bold().cyan());
    println!("  {}       – engage / release the emergency stop", "/estop  /clear".bold().cyan());
    println!("  {}         – shut down and exit", "/quit  /exit".bold().cyan());
    println!();
}
