use std::time::{Duration, Instant};

use log::warn;

use crate::gesture::{Detection, Gesture};
use crate::settings::GestureSettings;

/// Tunables for the stability tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How long a label has to be reported without interruption before it counts
    pub stabilization_window: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            stabilization_window: Duration::from_secs(1),
        }
    }
}

/// What the caller sees after `observe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerView {
    pub label: Option<Gesture>,
    pub armed: bool,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireDecision {
    Dispatch(String),
    NoOp,
}

/// Result of advancing an armed countdown by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CountdownTick {
    pub remaining: Duration,
    /// Fraction of the countdown already elapsed, in `[0, 1]`.
    pub progress: f64,
    /// Set only on the tick where `remaining` reaches zero.
    pub fire: Option<FireDecision>,
}

/// Temporal state for one detection stream.
///
/// Invariant: `countdown_armed` implies `countdown_deadline`, `countdown_duration`
/// and `stable_since` are all set, and `stable_since` belongs to `last_label`.
#[derive(Debug, Clone, Default)]
pub struct TrackerState {
    pub last_label: Option<Gesture>,
    pub stable_since: Option<Instant>,
    pub countdown_armed: bool,
    pub countdown_deadline: Option<Instant>,
    /// Length of the armed countdown, captured when arming.
    pub countdown_duration: Option<Duration>,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tick's detection.
    ///
    /// A label change wipes all accumulated stability and cancels any pending
    /// countdown. "No detection" is a label like any other.
    pub fn observe(
        &mut self,
        detection: &Detection,
        now: Instant,
        config: &TrackerConfig,
        countdown: Duration,
    ) -> TrackerView {
        if detection.label != self.last_label {
            self.last_label = detection.label;
            self.stable_since = None;
            self.disarm();
            return self.view();
        }

        match self.stable_since {
            None => self.stable_since = Some(now),
            Some(since) => {
                let held = now.saturating_duration_since(since);
                if held >= config.stabilization_window && !self.countdown_armed {
                    match now.checked_add(countdown) {
                        Some(deadline) => {
                            self.countdown_armed = true;
                            self.countdown_deadline = Some(deadline);
                            self.countdown_duration = Some(countdown);
                        }
                        None => warn!(
                            "Countdown of {}s is out of range for this clock, not arming",
                            countdown.as_secs()
                        ),
                    }
                }
            }
        }

        self.view()
    }

    /// Advance an armed countdown. Returns `None` while disarmed.
    pub fn tick(&self, now: Instant) -> Option<(Duration, f64)> {
        if !self.countdown_armed {
            return None;
        }
        let deadline = self.countdown_deadline?;
        let total = self.countdown_duration?;

        let remaining = deadline.saturating_duration_since(now);
        let progress = if total.is_zero() {
            1.0
        } else {
            let elapsed = total.saturating_sub(remaining);
            (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
        };
        Some((remaining, progress))
    }

    /// Advance the countdown and, on expiry, decide whether to dispatch.
    ///
    /// Expiry disarms synchronously and drops the stability anchor, so the
    /// same held gesture has to restabilize before it can arm again.
    pub fn tick_and_gate(&mut self, now: Instant, settings: &GestureSettings) -> Option<CountdownTick> {
        let (remaining, progress) = self.tick(now)?;

        if !remaining.is_zero() {
            return Some(CountdownTick {
                remaining,
                progress,
                fire: None,
            });
        }

        self.disarm();
        self.stable_since = None;

        let fire = match settings.bound_command(self.last_label) {
            Some(command) => FireDecision::Dispatch(command.to_string()),
            None => FireDecision::NoOp,
        };

        Some(CountdownTick {
            remaining,
            progress,
            fire: Some(fire),
        })
    }

    pub fn view(&self) -> TrackerView {
        TrackerView {
            label: self.last_label,
            armed: self.countdown_armed,
            deadline: self.countdown_deadline,
        }
    }

    fn disarm(&mut self) {
        self.countdown_armed = false;
        self.countdown_deadline = None;
        self.countdown_duration = None;
    }
}
