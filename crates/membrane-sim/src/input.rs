//! Strikes typed on stdin.
//!
//! Each line is either `x y` (normalized coordinates in `[0, 1]`), which
//! moves and re-arms the excitation, or `q` to stop after the current batch.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use membrane_core::{ExcitationTrigger, StopHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Strike(f32, f32),
    Quit,
    /// Blank line; nothing to do.
    Empty,
    Invalid,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
        return Command::Quit;
    }
    let mut parts = line.split(|c: char| c.is_whitespace() || c == ',').filter(|s| !s.is_empty());
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Command::Invalid;
    };
    match (x.parse::<f32>(), y.parse::<f32>()) {
        (Ok(x), Ok(y)) if (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y) => {
            Command::Strike(x, y)
        }
        _ => Command::Invalid,
    }
}

/// Read commands from stdin on a background thread until EOF or `q`.
pub fn spawn_strike_reader(
    trigger: ExcitationTrigger,
    stop: StopHandle,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("strike-input".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Command::Strike(x, y) => {
                        debug!(x, y, "strike");
                        trigger.set_excitation(x, y);
                    }
                    Command::Quit => {
                        info!("stop requested from input");
                        stop.request_stop();
                        break;
                    }
                    Command::Empty => {}
                    Command::Invalid => warn!("expected `x y` in [0, 1] or `q`, got {line:?}"),
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strike() {
        assert_eq!(parse_command("0.25 0.75"), Command::Strike(0.25, 0.75));
        assert_eq!(parse_command("  1,0 "), Command::Strike(1.0, 0.0));
        assert_eq!(parse_command("0.5\t0.5\n"), Command::Strike(0.5, 0.5));
    }

    #[test]
    fn test_parse_quit_and_empty() {
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command("QUIT"), Command::Quit);
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for line in ["0.5", "0.5 0.5 0.5", "a b", "1.5 0.2", "-0.1 0.3", "NaN 0.5"] {
            assert_eq!(parse_command(line), Command::Invalid, "{line:?}");
        }
    }
}
