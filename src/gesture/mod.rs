//! Gesture labels and per-frame detections.
//!
//! The detector is an external collaborator; this module only knows the closed
//! set of labels it was trained on and how to reduce a frame's raw boxes to a
//! single detection.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Minimum confidence the desktop variant required before trusting a box.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.55;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gesture {
    Thumb,
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    C,
    Horns,
    Fist,
}

impl Gesture {
    /// Every supported gesture, in settings-file order.
    pub const ALL: [Gesture; 10] = [
        Gesture::Thumb,
        Gesture::Zero,
        Gesture::One,
        Gesture::Two,
        Gesture::Three,
        Gesture::Four,
        Gesture::Five,
        Gesture::C,
        Gesture::Horns,
        Gesture::Fist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::Thumb => "Thumb",
            Gesture::Zero => "Zero",
            Gesture::One => "One",
            Gesture::Two => "Two",
            Gesture::Three => "Three",
            Gesture::Four => "Four",
            Gesture::Five => "Five",
            Gesture::C => "C",
            Gesture::Horns => "Horns",
            Gesture::Fist => "Fist",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gesture {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Gesture::ALL
            .iter()
            .copied()
            .find(|gesture| gesture.as_str() == value)
            .ok_or_else(|| anyhow!("unknown gesture '{value}'"))
    }
}

/// One tick's worth of detector output after filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub label: Option<Gesture>,
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: Gesture, confidence: f32) -> Self {
        Self {
            label: Some(label),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn none() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }
}

impl Default for Detection {
    fn default() -> Self {
        Self::none()
    }
}

/// A raw detector box before thresholding.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Reduce a frame's boxes to the single most confident supported gesture.
///
/// A box has to be strictly above `min_confidence` to count. Ties keep the
/// earlier box, matching the detector's own ordering.
pub fn select_best(candidates: &[Candidate], min_confidence: f32) -> Detection {
    let mut best: Option<(Gesture, f32)> = None;

    for candidate in candidates {
        if candidate.confidence <= min_confidence {
            continue;
        }
        let Ok(gesture) = candidate.label.parse::<Gesture>() else {
            log::debug!("ignoring unsupported detector label '{}'", candidate.label);
            continue;
        };
        match best {
            Some((_, confidence)) if confidence >= candidate.confidence => {}
            _ => best = Some((gesture, candidate.confidence)),
        }
    }

    match best {
        Some((gesture, confidence)) => Detection::new(gesture, confidence),
        None => Detection::none(),
    }
}
