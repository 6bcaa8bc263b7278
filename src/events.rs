//! JSON event lines on stdout for whatever UI sits on the other end.

use log::warn;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{dispatch::DispatchOutcome, gesture::Gesture, tracker::GestureFrame};

#[derive(Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum AppEvent<'a> {
    GestureFrame(&'a GestureFrame),
    CommandFinished(&'a DispatchOutcome),
}

pub fn emit(event: &AppEvent<'_>) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!("failed to serialize event: {err}"),
    }
}

/// The parts of a frame worth a new line; progress at whole-percent steps.
#[derive(Debug, PartialEq, Eq)]
struct FrameKey {
    label: Option<Gesture>,
    stable: bool,
    armed: bool,
    percent: u8,
    dispatched: Option<Uuid>,
}

impl FrameKey {
    fn of(frame: &GestureFrame) -> Self {
        Self {
            label: frame.label,
            stable: frame.stable,
            armed: frame.armed,
            percent: frame.progress_percent(),
            dispatched: frame.dispatched.as_ref().map(|record| record.id),
        }
    }
}

/// Emit a `gesture-frame` line whenever the visible state changes. Ends when
/// the controller publishing the frames is dropped.
pub async fn forward_frames(mut frames: watch::Receiver<GestureFrame>) {
    let mut last: Option<FrameKey> = None;
    while frames.changed().await.is_ok() {
        let frame = frames.borrow_and_update().clone();
        let key = FrameKey::of(&frame);
        if last.as_ref() != Some(&key) {
            emit(&AppEvent::GestureFrame(&frame));
            last = Some(key);
        }
    }
}

pub async fn forward_outcomes(mut outcomes: mpsc::UnboundedReceiver<DispatchOutcome>) {
    while let Some(outcome) = outcomes.recv().await {
        emit(&AppEvent::CommandFinished(&outcome));
    }
}
