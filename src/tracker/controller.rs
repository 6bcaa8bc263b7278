use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    dispatch::{CommandDispatcher, DispatchRecord},
    gesture::{Detection, Gesture},
    settings::SettingsStore,
};

use super::{FireDecision, TrackerConfig, TrackerState};

const PREVIEW_CHARS: usize = 25;

/// Everything the UI needs to render one tick.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GestureFrame {
    pub label: Option<Gesture>,
    /// The label has held for the full stabilization window.
    pub stable: bool,
    pub armed: bool,
    pub progress: f64,
    pub remaining_ms: u64,
    pub command_preview: Option<String>,
    pub dispatched: Option<DispatchRecord>,
    pub emitted_at: DateTime<Utc>,
}

impl Default for GestureFrame {
    fn default() -> Self {
        Self {
            label: None,
            stable: false,
            armed: false,
            progress: 0.0,
            remaining_ms: 0,
            command_preview: None,
            dispatched: None,
            emitted_at: Utc::now(),
        }
    }
}

impl GestureFrame {
    /// Whole-percent progress, the granularity a progress bar shows.
    pub fn progress_percent(&self) -> u8 {
        (self.progress * 100.0).floor().clamp(0.0, 100.0) as u8
    }
}

/// Single owner of the tracker state for one detection stream.
///
/// Drivers hold the controller by value; other threads only ever see the
/// frames published through [`GestureController::subscribe`].
pub struct GestureController {
    state: TrackerState,
    config: TrackerConfig,
    settings: Arc<SettingsStore>,
    dispatcher: Arc<dyn CommandDispatcher>,
    frames: watch::Sender<GestureFrame>,
}

impl GestureController {
    pub fn new(
        config: TrackerConfig,
        settings: Arc<SettingsStore>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        let (frames, _) = watch::channel(GestureFrame::default());
        Self {
            state: TrackerState::new(),
            config,
            settings,
            dispatcher,
            frames,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GestureFrame> {
        self.frames.subscribe()
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    /// Run one tick: observe, advance the countdown, dispatch on expiry and
    /// publish the resulting frame.
    pub fn on_detection(&mut self, detection: &Detection, now: Instant) -> GestureFrame {
        let settings = self.settings.snapshot();
        let countdown = Duration::from_secs(settings.countdown_secs);

        let before = self.state.view();
        let view = self.state.observe(detection, now, &self.config, countdown);
        if view.label != before.label && before.armed {
            info!(
                "Countdown for {} cancelled by {}",
                label_name(before.label),
                label_name(view.label)
            );
        } else if view.armed && !before.armed {
            debug!("{} stable, countdown armed for {}s", label_name(view.label), settings.countdown_secs);
        }

        let tick = self.state.tick_and_gate(now, &settings);
        let (progress, remaining, fired) = match tick {
            Some(tick) => (tick.progress, tick.remaining, tick.fire),
            None => (0.0, Duration::ZERO, None),
        };
        let expired = fired.is_some();

        let dispatched = match fired {
            Some(FireDecision::Dispatch(command)) => {
                info!("{} countdown expired, dispatching command", label_name(view.label));
                Some(self.dispatcher.dispatch(&command))
            }
            Some(FireDecision::NoOp) => {
                debug!("{} countdown expired with nothing bound", label_name(view.label));
                None
            }
            None => None,
        };

        let frame = GestureFrame {
            label: view.label,
            stable: self.state.countdown_armed || expired,
            armed: self.state.countdown_armed,
            progress,
            remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            command_preview: settings
                .bound_command(view.label)
                .map(truncate_for_display),
            dispatched,
            emitted_at: Utc::now(),
        };

        self.frames.send_replace(frame.clone());
        frame
    }
}

fn label_name(label: Option<Gesture>) -> &'static str {
    label.map(|gesture| gesture.as_str()).unwrap_or("no detection")
}

pub fn truncate_for_display(command: &str) -> String {
    if command.chars().count() > PREVIEW_CHARS {
        let head: String = command.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        command.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use crate::settings::{GestureSettings, MAX_COUNTDOWN_SECS};
    use tempfile::tempdir;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn controller_with(
        settings: GestureSettings,
    ) -> (GestureController, Arc<RecordingDispatcher>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.txt")).unwrap();
        store.replace(settings).unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let controller = GestureController::new(
            TrackerConfig::default(),
            Arc::new(store),
            dispatcher.clone(),
        );
        (controller, dispatcher, dir)
    }

    #[test]
    fn truncates_long_commands_for_display() {
        assert_eq!(truncate_for_display("echo hi"), "echo hi");
        let long = "xdg-open https://www.youtube.com/watch";
        assert_eq!(truncate_for_display(long), "xdg-open https://www.yout...");
        assert_eq!(truncate_for_display(&"x".repeat(25)), "x".repeat(25));
    }

    #[test]
    fn frames_report_progress_and_preview() {
        let settings = GestureSettings::default()
            .with_binding(Gesture::Five, "xdg-open https://www.youtube.com");
        let (mut controller, _, _dir) = controller_with(settings);
        let rx = controller.subscribe();
        let t0 = Instant::now();
        let five = Detection::new(Gesture::Five, 0.8);

        let mut frame = controller.on_detection(&five, t0);
        assert_eq!(frame.command_preview.as_deref(), Some("xdg-open https://www.yout..."));
        assert!(!frame.armed);

        for step in 1..=11 {
            frame = controller.on_detection(&five, t0 + ms(step * 100));
        }
        // armed at 1100ms with a 3s countdown
        assert!(frame.armed && frame.stable);
        assert_eq!(frame.remaining_ms, 3000);

        frame = controller.on_detection(&five, t0 + ms(2600));
        assert_eq!(frame.progress_percent(), 50);
        assert_eq!(*rx.borrow(), frame);
    }

    #[test]
    fn longest_countdown_reports_exact_remaining() {
        let settings = GestureSettings::default()
            .with_binding(Gesture::Four, "echo later")
            .with_countdown(MAX_COUNTDOWN_SECS);
        let (mut controller, dispatcher, _dir) = controller_with(settings);
        let t0 = Instant::now();
        let four = Detection::new(Gesture::Four, 0.9);

        let mut frame = controller.on_detection(&four, t0);
        for step in 1..=11 {
            frame = controller.on_detection(&four, t0 + ms(step * 100));
        }
        assert!(frame.armed);
        assert_eq!(frame.remaining_ms, MAX_COUNTDOWN_SECS * 1000);

        frame = controller.on_detection(&four, t0 + ms(1100) + Duration::from_secs(MAX_COUNTDOWN_SECS));
        assert_eq!(frame.remaining_ms, 0);
        assert_eq!(dispatcher.commands(), vec!["echo later".to_string()]);
    }

    #[test]
    fn dispatches_through_the_dispatcher() {
        let settings = GestureSettings::default().with_binding(Gesture::Thumb, "echo hi");
        let (mut controller, dispatcher, _dir) = controller_with(settings);
        let t0 = Instant::now();
        let thumb = Detection::new(Gesture::Thumb, 0.9);

        let mut fired = Vec::new();
        for step in 0..=45 {
            let frame = controller.on_detection(&thumb, t0 + ms(step * 100));
            if let Some(record) = frame.dispatched {
                fired.push((step, record.command));
            }
        }

        assert_eq!(fired, vec![(41, "echo hi".to_string())]);
        assert_eq!(dispatcher.commands(), vec!["echo hi".to_string()]);
    }

    #[test]
    fn settings_edits_apply_on_the_next_tick() {
        let (mut controller, dispatcher, _dir) = controller_with(GestureSettings::default());
        let t0 = Instant::now();
        let horns = Detection::new(Gesture::Horns, 0.9);

        for step in 0..=20 {
            controller.on_detection(&horns, t0 + ms(step * 100));
        }
        controller
            .settings
            .update_binding(Gesture::Horns, "echo late")
            .unwrap();
        for step in 21..=45 {
            controller.on_detection(&horns, t0 + ms(step * 100));
        }

        assert_eq!(dispatcher.commands(), vec!["echo late".to_string()]);
    }
}
