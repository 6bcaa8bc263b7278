use anyhow::{bail, Context, Result};
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use crate::gesture::Gesture;

const SEPARATOR: &str = "<=>";
const COUNTDOWN_KEY: &str = "countdown";
const DEFAULT_COUNTDOWN_SECS: u64 = 3;
/// Longest accepted countdown, one day.
pub const MAX_COUNTDOWN_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureSettings {
    /// Every supported gesture has an entry; an empty command means "do nothing".
    pub bindings: BTreeMap<Gesture, String>,
    pub countdown_secs: u64,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            bindings: Gesture::ALL
                .iter()
                .map(|gesture| (*gesture, String::new()))
                .collect(),
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
        }
    }
}

impl GestureSettings {
    pub fn binding(&self, gesture: Gesture) -> &str {
        self.bindings.get(&gesture).map(String::as_str).unwrap_or("")
    }

    /// The command to run for `label`, if one is actually bound.
    pub fn bound_command(&self, label: Option<Gesture>) -> Option<&str> {
        let command = self.binding(label?);
        (!command.is_empty()).then_some(command)
    }

    pub fn with_binding(mut self, gesture: Gesture, command: impl Into<String>) -> Self {
        self.bindings.insert(gesture, command.into());
        self
    }

    pub fn with_countdown(mut self, countdown_secs: u64) -> Self {
        self.countdown_secs = countdown_secs;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.countdown_secs == 0 {
            bail!("countdown must be at least one second");
        }
        if self.countdown_secs > MAX_COUNTDOWN_SECS {
            bail!("countdown must not exceed {MAX_COUNTDOWN_SECS} seconds");
        }
        for (gesture, command) in &self.bindings {
            if command.contains(['\n', '\r']) {
                bail!("command bound to {gesture} must fit on one line");
            }
            // line ends are trimmed on load, so this would not read back
            if command.trim() != command {
                bail!("command bound to {gesture} must not start or end with whitespace");
            }
        }
        Ok(())
    }

    /// Parse the `KEY<=>VALUE` format. Bad lines are skipped and reported.
    pub fn parse(contents: &str) -> (Self, Vec<SettingsIssue>) {
        let mut settings = Self::default();
        let mut issues = Vec::new();

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(SEPARATOR) else {
                issues.push(SettingsIssue::new(line_no, format!("missing '{SEPARATOR}' separator")));
                continue;
            };

            if key == COUNTDOWN_KEY {
                match value.parse::<u64>() {
                    Ok(0) => issues.push(SettingsIssue::new(line_no, "countdown must be positive")),
                    Ok(secs) if secs > MAX_COUNTDOWN_SECS => issues.push(SettingsIssue::new(
                        line_no,
                        format!("countdown {secs} exceeds the {MAX_COUNTDOWN_SECS}s limit"),
                    )),
                    Ok(secs) => settings.countdown_secs = secs,
                    Err(_) => issues.push(SettingsIssue::new(
                        line_no,
                        format!("countdown '{value}' is not a whole number of seconds"),
                    )),
                }
                continue;
            }

            match key.parse::<Gesture>() {
                Ok(gesture) => {
                    settings.bindings.insert(gesture, value.to_string());
                }
                Err(err) => issues.push(SettingsIssue::new(line_no, err.to_string())),
            }
        }

        (settings, issues)
    }

    /// Render the full file: gestures in fixed order, countdown last.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for gesture in Gesture::ALL {
            out.push_str(gesture.as_str());
            out.push_str(SEPARATOR);
            out.push_str(self.binding(gesture));
            out.push('\n');
        }
        out.push_str(COUNTDOWN_KEY);
        out.push_str(SEPARATOR);
        out.push_str(&self.countdown_secs.to_string());
        out.push('\n');
        out
    }
}

/// A settings line that was skipped while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsIssue {
    pub line: usize,
    pub reason: String,
}

impl SettingsIssue {
    fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SettingsIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Read settings from disk. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<(GestureSettings, Vec<SettingsIssue>)> {
    if !path.exists() {
        return Ok((GestureSettings::default(), Vec::new()));
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let (settings, issues) = GestureSettings::parse(&contents);
    for issue in &issues {
        log::warn!("Skipping settings {} in {}", issue, path.display());
    }
    Ok((settings, issues))
}

/// Owns the settings file and the current immutable snapshot.
///
/// Readers take an `Arc` snapshot; edits persist first and then swap a fresh
/// snapshot in, so a reader never sees a half-applied change.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Arc<GestureSettings>>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let (data, _) = load_settings(&path)?;
        Ok(Self {
            path,
            data: RwLock::new(Arc::new(data)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<GestureSettings> {
        let guard = self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, settings: GestureSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persist(&settings)?;
        *guard = Arc::new(settings);
        Ok(())
    }

    pub fn update_binding(&self, gesture: Gesture, command: impl Into<String>) -> Result<()> {
        let next = (*self.snapshot()).clone().with_binding(gesture, command);
        self.replace(next)
    }

    pub fn update_countdown(&self, countdown_secs: u64) -> Result<()> {
        let next = (*self.snapshot()).clone().with_countdown(countdown_secs);
        self.replace(next)
    }

    fn persist(&self, data: &GestureSettings) -> Result<()> {
        let tmp_path = temp_path_for(&self.path);
        fs::write(&tmp_path, data.render())
            .with_context(|| format!("Failed to write settings to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move settings into {}", self.path.display()))
    }
}

impl SettingsStore {
    pub fn reload(&self) -> Result<Vec<SettingsIssue>> {
        let (data, issues) = load_settings(&self.path)?;
        let mut guard = self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(data);
        Ok(issues)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "settings".into());
    path.with_file_name(format!(".{name}.tmp"))
}
