use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use gesturectl_lib::{
    dispatch::RecordingDispatcher,
    gesture::{Detection, Gesture},
    settings::{load_settings, GestureSettings, SettingsStore},
    tracker::{GestureController, TrackerConfig, TrackerState},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::{tempdir, TempDir};

const FRAME: Duration = Duration::from_millis(30);

struct Rig {
    controller: GestureController,
    dispatcher: Arc<RecordingDispatcher>,
    t0: Instant,
    now: Instant,
    _dir: TempDir,
}

impl Rig {
    fn new(settings: GestureSettings) -> Self {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.txt")).unwrap();
        store.replace(settings).unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let controller =
            GestureController::new(TrackerConfig::default(), Arc::new(store), dispatcher.clone());
        let t0 = Instant::now();
        Self {
            controller,
            dispatcher,
            t0,
            now: t0,
            _dir: dir,
        }
    }

    /// Feed `label` every frame for `secs` seconds of wall time.
    fn hold(&mut self, label: Option<Gesture>, secs: f64) {
        let detection = match label {
            Some(gesture) => Detection::new(gesture, 0.9),
            None => Detection::none(),
        };
        let until = self.now + Duration::from_secs_f64(secs);
        while self.now < until {
            self.controller.on_detection(&detection, self.now);
            self.now += FRAME;
        }
    }

    fn elapsed(&self) -> Duration {
        self.now - self.t0
    }
}

#[test]
fn switching_gestures_mid_countdown_aborts_it() {
    let settings = GestureSettings::default()
        .with_binding(Gesture::Fist, "echo fist")
        .with_binding(Gesture::Five, "echo five");
    let mut rig = Rig::new(settings);

    rig.hold(Some(Gesture::Fist), 1.2);
    assert!(rig.controller.state().countdown_armed);
    let deadline = rig.controller.state().countdown_deadline.unwrap();
    assert!(deadline > rig.now);

    rig.hold(Some(Gesture::Fist), 1.1);
    rig.hold(Some(Gesture::Five), 0.5);
    let state = rig.controller.state();
    assert_eq!(state.last_label, Some(Gesture::Five));
    assert!(!state.countdown_armed);
    assert!(rig.dispatcher.commands().is_empty());

    // Five now needs its own full window before anything is armed
    rig.hold(Some(Gesture::Five), 0.45);
    assert!(!rig.controller.state().countdown_armed);
    rig.hold(Some(Gesture::Five), 0.2);
    assert!(rig.controller.state().countdown_armed);
}

#[test]
fn held_thumb_runs_its_command_exactly_once() {
    let settings = GestureSettings::default()
        .with_binding(Gesture::Thumb, "echo hi")
        .with_countdown(3);
    let mut rig = Rig::new(settings);

    rig.hold(Some(Gesture::Thumb), 3.9);
    assert!(rig.dispatcher.commands().is_empty());

    rig.hold(Some(Gesture::Thumb), 0.3);
    assert!(rig.elapsed() < Duration::from_secs(5));
    assert_eq!(rig.dispatcher.commands(), vec!["echo hi".to_string()]);

    // Removing the hand afterwards never fires anything else
    rig.hold(None, 6.0);
    assert_eq!(rig.dispatcher.commands().len(), 1);
}

#[test]
fn empty_binding_expires_quietly() {
    let settings = GestureSettings::default().with_binding(Gesture::Zero, "");
    let mut rig = Rig::new(settings);

    rig.hold(Some(Gesture::Zero), 1.2);
    assert!(rig.controller.state().countdown_armed);

    rig.hold(Some(Gesture::Zero), 3.0);
    assert!(!rig.controller.state().countdown_armed);
    assert!(rig.dispatcher.commands().is_empty());
}

#[test]
fn dropping_out_of_frame_cancels_a_pending_command() {
    let settings = GestureSettings::default().with_binding(Gesture::Horns, "echo horns");
    let mut rig = Rig::new(settings);

    rig.hold(Some(Gesture::Horns), 2.5);
    rig.hold(None, 10.0);

    assert!(rig.dispatcher.commands().is_empty());
    // no detection itself stabilized and armed, but has nothing to run
    assert_eq!(rig.controller.state().last_label, None);
}

#[test]
fn settings_survive_a_write_read_cycle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.txt");
    let store = SettingsStore::new(path.clone()).unwrap();

    let mut settings = GestureSettings::default().with_countdown(12);
    for (index, gesture) in Gesture::ALL.iter().enumerate() {
        if index % 3 != 0 {
            settings = settings.with_binding(*gesture, format!("notify-send '{gesture} #{index}'"));
        }
    }
    store.replace(settings.clone()).unwrap();

    let (loaded, issues) = load_settings(&path).unwrap();
    assert!(issues.is_empty());
    assert_eq!(loaded.bindings, settings.bindings);
    assert_eq!(loaded.countdown_secs, 12);
}

#[test]
fn random_streams_respect_stability_rules() {
    let config = TrackerConfig::default();
    let countdown = Duration::from_secs(2);
    let labels: Vec<Option<Gesture>> = std::iter::once(None)
        .chain(Gesture::ALL.iter().take(3).copied().map(Some))
        .collect();

    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = TrackerState::new();
        let t0 = Instant::now();
        let mut now = t0;
        let mut run_start = t0;

        for _ in 0..2000 {
            now += Duration::from_millis(rng.gen_range(5..120));
            // mostly keep the current label so runs get long enough to arm
            let label = if rng.gen_bool(0.03) {
                labels[rng.gen_range(0..labels.len())]
            } else {
                state.last_label
            };
            let before = state.clone();
            let view = state.observe(&Detection { label, confidence: 0.9 }, now, &config, countdown);

            if label != before.last_label {
                assert!(!view.armed);
                assert!(state.stable_since.is_none());
                run_start = now;
                continue;
            }
            if before.countdown_armed {
                assert!(view.armed);
                assert_eq!(view.deadline, before.countdown_deadline);
            } else if view.armed {
                assert!(now - run_start >= config.stabilization_window);
                assert_eq!(view.deadline, Some(now + countdown));
            }
            state.tick_and_gate(now, &GestureSettings::default());
        }
    }
}

#[test]
fn oversized_countdown_in_file_falls_back_to_default() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.txt");
    std::fs::write(&path, format!("Thumb<=>echo hi\ncountdown<=>{}\n", u64::MAX)).unwrap();

    let store = Arc::new(SettingsStore::new(path).unwrap());
    assert_eq!(store.snapshot().countdown_secs, 3);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut controller = GestureController::new(TrackerConfig::default(), store, dispatcher.clone());
    let t0 = Instant::now();
    let thumb = Detection::new(Gesture::Thumb, 0.9);
    for step in 0..=45u64 {
        controller.on_detection(&thumb, t0 + Duration::from_millis(step * 100));
    }

    assert_eq!(dispatcher.commands(), vec!["echo hi".to_string()]);
}
