use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    driver::{DriverKind, DEFAULT_TICK_INTERVAL},
    gesture::{Gesture, DEFAULT_MIN_CONFIDENCE},
    tracker::TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "gesturectl", about = "Run shell commands from webcam hand gestures")]
pub struct Cli {
    /// Gesture bindings file (KEY<=>VALUE lines)
    #[arg(long, global = true, env = "GESTURECTL_SETTINGS", default_value = "settings.txt")]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Read detections and run bound commands
    Run(RunArgs),
    /// Print the current bindings file
    Show,
    /// Bind a command to a gesture; no command unbinds it
    Bind {
        gesture: Gesture,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Set the countdown length in seconds
    Countdown { secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverChoice {
    Interval,
    Blocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceChoice {
    /// Detector output piped in, one frame per line
    Stdin,
    /// Built-in scripted demo
    Simulate,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = DriverChoice::Interval)]
    pub driver: DriverChoice,

    #[arg(long, value_enum, default_value_t = SourceChoice::Stdin)]
    pub source: SourceChoice,

    /// Sampling period of the interval driver
    #[arg(long, default_value_t = DEFAULT_TICK_INTERVAL.as_millis() as u64)]
    pub tick_ms: u64,

    /// Boxes at or below this confidence count as no detection
    #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
    pub min_confidence: f32,

    /// How long a gesture must be held before the countdown starts
    #[arg(long, default_value_t = 1000)]
    pub window_ms: u64,

    /// Log commands instead of running them
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn driver_kind(&self) -> DriverKind {
        match self.driver {
            DriverChoice::Interval => DriverKind::Interval {
                tick_interval: self.tick_interval(),
            },
            DriverChoice::Blocking => DriverKind::Blocking,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            stabilization_window: Duration::from_millis(self.window_ms),
        }
    }
}

pub fn debug_enabled() -> bool {
    std::env::var("GESTURECTL_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_follow_the_desktop_app() {
        let cli = Cli::try_parse_from(["gesturectl", "run"]).unwrap();
        let CliCommand::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.driver_kind(), DriverKind::Interval {
            tick_interval: Duration::from_millis(30)
        });
        assert_eq!(args.tracker_config().stabilization_window, Duration::from_secs(1));
        assert!((args.min_confidence - 0.55).abs() < f32::EPSILON);
        assert!(!args.dry_run);
    }

    #[test]
    fn bind_takes_the_rest_of_the_line() {
        let cli = Cli::try_parse_from([
            "gesturectl",
            "--settings",
            "/tmp/g.txt",
            "bind",
            "Fist",
            "xdg-open",
            "-n",
            "https://www.google.com",
        ])
        .unwrap();
        assert_eq!(cli.settings, PathBuf::from("/tmp/g.txt"));
        match cli.command {
            CliCommand::Bind { gesture, command } => {
                assert_eq!(gesture, Gesture::Fist);
                assert_eq!(command.join(" "), "xdg-open -n https://www.google.com");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_gestures_are_rejected() {
        assert!(Cli::try_parse_from(["gesturectl", "bind", "Peace", "ls"]).is_err());
    }
}
