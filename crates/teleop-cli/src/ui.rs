//! Console operator.
//!
//! Reads one instruction per line from stdin and prints every phase change.

use std::sync::Arc;

use teleop_client::{ClientConfig, Credentials, StaticAccount, Supervisor};
use teleop_types::{Angle, Command, CommandError};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "<speed> <angle> | stop | reset | quit";

#[derive(Debug, PartialEq)]
enum Input {
    Drive(Command),
    Stop,
    Reset,
    Quit,
}

#[derive(Debug, PartialEq)]
enum InputError {
    Unrecognized,
    Command(CommandError),
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrecognized => write!(f, "expected {HELP}"),
            Self::Command(e) => write!(f, "{e}"),
        }
    }
}

fn parse_input(line: &str) -> Result<Option<Input>, InputError> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };

    let input = match (first, words.next(), words.next()) {
        ("stop", None, None) => Input::Stop,
        ("reset", None, None) => Input::Reset,
        ("quit" | "exit", None, None) => Input::Quit,
        (speed, Some(angle), None) => {
            let speed: f64 = speed.parse().map_err(|_| InputError::Unrecognized)?;
            let angle: u16 = angle.parse().map_err(|_| InputError::Unrecognized)?;
            Input::Drive(Command::new(speed, angle).map_err(InputError::Command)?)
        }
        _ => return Err(InputError::Unrecognized),
    };
    Ok(Some(input))
}

pub async fn run(config: ClientConfig, token: String) -> anyhow::Result<()> {
    let account = Arc::new(StaticAccount::new(Credentials::new(token)));
    let (handle, task) = Supervisor::spawn(config, account);
    let mut status = handle.status_receiver();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut heading = Angle::new(0)?;

    println!("phase: {}", handle.status());
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Ok(Some(Input::Drive(command))) => {
                        heading = command.angle;
                        handle.submit_command(command)?;
                    }
                    Ok(Some(Input::Stop)) => handle.submit_command(Command::stop(heading))?,
                    Ok(Some(Input::Reset)) => handle.reset()?,
                    Ok(Some(Input::Quit)) => break,
                    Ok(None) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("phase: {}", *status.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    task.await??;
    Ok(())
}
