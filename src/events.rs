use crate::error::TransportError;
use crate::state::{Configuration, DetectionResult, SessionStats};

/// Operator actions routed to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    /// Free-form patch for `POST /api/config`
    UpdateConfig(serde_json::Value),
    /// Re-run the connectivity probe
    CheckHealth,
}

impl Command {
    /// Parse one line of operator input. Returns `Err` with a hint for unknown input.
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "reset" => Ok(Command::Reset),
            "health" => Ok(Command::CheckHealth),
            "config" => {
                let patch: serde_json::Value =
                    serde_json::from_str(rest).map_err(|e| format!("config expects a JSON object: {}", e))?;
                if !patch.is_object() {
                    return Err("config expects a JSON object".to_string());
                }
                Ok(Command::UpdateConfig(patch))
            }
            other => Err(format!(
                "unknown command {:?} (start, stop, reset, health, config <json>, quit)",
                other
            )),
        }
    }
}

/// Session and reset generation a frame or stats request was dispatched under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub session: u64,
    /// Number of successful resets before the request left
    pub generation: u64,
}

/// Results of background work, delivered back to the controller in arrival order.
#[derive(Debug)]
pub enum Event {
    Health(Result<serde_json::Value, TransportError>),
    Config(Result<Configuration, TransportError>),
    ConfigUpdated(Result<Configuration, TransportError>),
    Frame {
        dispatch: Dispatch,
        result: Result<DetectionResult, TransportError>,
    },
    Stats {
        dispatch: Dispatch,
        result: Result<SessionStats, TransportError>,
    },
    ResetDone(Result<(), TransportError>),
}
