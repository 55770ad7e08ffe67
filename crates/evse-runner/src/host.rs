//! Host commands read from stdin.
//!
//! Stands in for the network side of the bridge: each line is one command.
//!
//! | Line | Event |
//! |---|---|
//! | `on`, `off`, `toggle` | charger on/off |
//! | `backlight on\|off\|toggle` | display backlight |
//! | `limit <wh>` | energy limit (`limit none` for unlimited) |
//! | `identify [blinks]` | blink the display |
//! | `connected`, `disconnected` | network state |

use std::io::BufRead;
use std::thread;

use crossbeam_channel::Sender;
use evse_bridge::{Endpoint, Event, OnOffCommand, UNLIMITED_ENERGY};
use tracing::warn;

use crate::error::RunnerResult;
use crate::event_loop::Input;

/// Parse one line into an event.
pub fn parse_host_command(line: &str, default_blinks: u16) -> Result<Event, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".into());
    };
    let arg = words.next();
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }

    let event = match (verb.to_ascii_lowercase().as_str(), arg) {
        ("backlight", Some(value)) => Event::OnOff {
            endpoint: Endpoint::Backlight,
            command: parse_on_off(value)?,
        },
        ("limit", Some("none")) => Event::SetEnergyLimit(UNLIMITED_ENERGY),
        ("limit", Some(value)) => {
            let limit: u32 = value.parse().map_err(|_| format!("invalid limit '{value}'"))?;
            if limit > UNLIMITED_ENERGY {
                return Err(format!("limit {limit} exceeds {UNLIMITED_ENERGY}"));
            }
            Event::SetEnergyLimit(limit)
        }
        ("identify", None) => Event::Identify { blinks: default_blinks },
        ("identify", Some(value)) => Event::Identify {
            blinks: value.parse().map_err(|_| format!("invalid blink count '{value}'"))?,
        },
        ("connected", None) => Event::NetworkStateChanged { connected: true },
        ("disconnected", None) => Event::NetworkStateChanged { connected: false },
        (word, None) => Event::OnOff {
            endpoint: Endpoint::Charger,
            command: parse_on_off(word)?,
        },
        _ => return Err(format!("unknown command '{line}'")),
    };
    Ok(event)
}

fn parse_on_off(word: &str) -> Result<OnOffCommand, String> {
    match word.to_ascii_lowercase().as_str() {
        "on" => Ok(OnOffCommand::On),
        "off" => Ok(OnOffCommand::Off),
        "toggle" => Ok(OnOffCommand::Toggle),
        _ => Err(format!("unknown command '{word}'")),
    }
}

/// Read commands from stdin on a background thread.
///
/// The thread is detached; it ends with stdin or when the receiver goes away.
pub fn spawn_stdin_reader(tx: Sender<Input>, default_blinks: u16) -> RunnerResult<()> {
    thread::Builder::new().name("host-stdin".into()).spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_host_command(&line, default_blinks) {
                Ok(event) => {
                    if tx.send(Input::Host(event)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring host command: {}", e),
            }
        }
    })?;
    Ok(())
}
