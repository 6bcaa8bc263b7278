//! Where detections come from.
//!
//! The detector itself (camera plus model) lives outside this crate. A source
//! only has to hand over one filtered [`Detection`] per frame, blocking until
//! the frame is available.

use std::{io::BufRead, thread, time::Duration};

use anyhow::{Context, Result};
use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::gesture::{select_best, Candidate, Detection, Gesture};

pub trait DetectionSource: Send {
    /// Block until the next frame. `Ok(None)` means the source is exhausted;
    /// an error means it failed for good.
    fn next_detection(&mut self) -> Result<Option<Detection>>;
}

/// Reads one frame per line from an external detector process.
///
/// Each line holds whitespace-separated `label:confidence` boxes; an empty line
/// or `none` is a frame without detections.
pub struct LineSource<R> {
    reader: R,
    min_confidence: f32,
    buf: String,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R, min_confidence: f32) -> Self {
        Self {
            reader,
            min_confidence,
            buf: String::new(),
        }
    }
}

impl<R: BufRead + Send> DetectionSource for LineSource<R> {
    fn next_detection(&mut self) -> Result<Option<Detection>> {
        self.buf.clear();
        let read = self
            .reader
            .read_line(&mut self.buf)
            .context("failed to read detector output")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(parse_frame(&self.buf, self.min_confidence)))
    }
}

pub fn parse_frame(line: &str, min_confidence: f32) -> Detection {
    let line = line.trim();
    if line.is_empty() || line.eq_ignore_ascii_case("none") {
        return Detection::none();
    }

    let candidates: Vec<Candidate> = line
        .split_whitespace()
        .filter_map(|token| {
            let parsed = token
                .rsplit_once(':')
                .and_then(|(label, confidence)| Some((label, confidence.parse::<f32>().ok()?)));
            if parsed.is_none() {
                warn!("ignoring malformed detector token '{token}'");
            }
            parsed.map(|(label, confidence)| Candidate::new(label, confidence))
        })
        .collect();

    select_best(&candidates, min_confidence)
}

/// Plays back a scripted sequence of gestures at a fixed frame rate.
///
/// Confidence is jittered and, with probability `flicker_rate`, a frame is
/// replaced by a random other label to mimic a noisy detector.
pub struct SimulatedSource {
    script: Vec<(Option<Gesture>, usize)>,
    segment: usize,
    emitted: usize,
    frame_interval: Duration,
    flicker_rate: f64,
    rng: StdRng,
}

impl SimulatedSource {
    pub fn new(script: Vec<(Option<Gesture>, usize)>, frame_interval: Duration) -> Self {
        Self {
            script,
            segment: 0,
            emitted: 0,
            frame_interval,
            flicker_rate: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_flicker(mut self, flicker_rate: f64, seed: Option<u64>) -> Self {
        self.flicker_rate = flicker_rate.clamp(0.0, 1.0);
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    /// A short show-and-tell: idle, hold Thumb, drop out, wave Fist into Five.
    pub fn demo(frame_interval: Duration) -> Self {
        let frames = |secs: f64| (secs / frame_interval.as_secs_f64().max(0.001)).ceil() as usize;
        Self::new(
            vec![
                (None, frames(1.0)),
                (Some(Gesture::Thumb), frames(5.0)),
                (None, frames(1.5)),
                (Some(Gesture::Fist), frames(1.5)),
                (Some(Gesture::Five), frames(5.0)),
                (None, frames(1.0)),
            ],
            frame_interval,
        )
        .with_flicker(0.02, None)
    }

    fn flicker(&mut self, actual: Option<Gesture>) -> Option<Gesture> {
        let pick = self.rng.gen_range(0..=Gesture::ALL.len());
        let noisy = Gesture::ALL.get(pick).copied();
        if noisy == actual {
            None
        } else {
            noisy
        }
    }
}

impl DetectionSource for SimulatedSource {
    fn next_detection(&mut self) -> Result<Option<Detection>> {
        while let Some((_, count)) = self.script.get(self.segment) {
            if self.emitted < *count {
                break;
            }
            self.segment += 1;
            self.emitted = 0;
        }
        let Some((label, _)) = self.script.get(self.segment).copied() else {
            return Ok(None);
        };
        self.emitted += 1;

        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }

        let label = if self.flicker_rate > 0.0 && self.rng.gen_bool(self.flicker_rate) {
            self.flicker(label)
        } else {
            label
        };

        Ok(Some(match label {
            Some(gesture) => Detection::new(gesture, self.rng.gen_range(0.6..0.98)),
            None => Detection::none(),
        }))
    }
}
