//! Running bound commands.
//!
//! Command strings come straight from the settings file and are handed to the
//! host shell verbatim. They carry exactly the privileges of the user running
//! the service; nothing here escapes or sandboxes them.

use std::{process::Stdio, sync::Mutex};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{process::Command, runtime::Handle, sync::mpsc, time::Instant};
use uuid::Uuid;

/// A command handed to the dispatcher. Returned before the command finishes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub id: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn new(command: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.to_string(),
            started_at: Utc::now(),
        }
    }
}

/// How a dispatched command ended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub id: Uuid,
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the shell itself could not be launched.
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

pub trait CommandDispatcher: Send + Sync {
    /// Start `command` and return immediately. Failures are reported, never raised.
    fn dispatch(&self, command: &str) -> DispatchRecord;
}

/// Fire-and-forget shell execution on a tokio runtime.
pub struct ShellDispatcher {
    runtime: Handle,
    reports: Option<mpsc::UnboundedSender<DispatchOutcome>>,
}

impl ShellDispatcher {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            reports: None,
        }
    }

    /// Also send every outcome to `reports` once the command exits.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<DispatchOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }
}

impl CommandDispatcher for ShellDispatcher {
    fn dispatch(&self, command: &str) -> DispatchRecord {
        let record = DispatchRecord::new(command);
        info!("Dispatching [{}]: {}", record.id, record.command);

        let task_record = record.clone();
        let reports = self.reports.clone();
        self.runtime.spawn(async move {
            let outcome = run_shell(&task_record).await;
            if let Some(tx) = reports {
                let _ = tx.send(outcome);
            }
        });

        record
    }
}

async fn run_shell(record: &DispatchRecord) -> DispatchOutcome {
    let started = Instant::now();
    let result = shell_command(&record.command)
        .stdin(Stdio::null())
        .output()
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let success = output.status.success();
            if success {
                info!("Command [{}] finished in {}ms", record.id, elapsed_ms);
            } else {
                warn!(
                    "Command [{}] exited with {} after {}ms: {}",
                    record.id,
                    output.status,
                    elapsed_ms,
                    stderr.trim()
                );
            }
            if !stdout.trim().is_empty() {
                debug!("Command [{}] stdout: {}", record.id, stdout.trim());
            }
            DispatchOutcome {
                id: record.id,
                command: record.command.clone(),
                success,
                exit_code: output.status.code(),
                stdout,
                stderr,
                error: None,
                elapsed_ms,
            }
        }
        Err(err) => {
            error!("Failed to launch command [{}] '{}': {err}", record.id, record.command);
            DispatchOutcome {
                id: record.id,
                command: record.command.clone(),
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                error: Some(err.to_string()),
                elapsed_ms,
            }
        }
    }
}

#[cfg(not(windows))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Records commands instead of running them. Backs `--dry-run`.
#[derive(Default)]
pub struct RecordingDispatcher {
    records: Mutex<Vec<DispatchRecord>>,
}

impl RecordingDispatcher {
    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.records().into_iter().map(|record| record.command).collect()
    }
}

impl CommandDispatcher for RecordingDispatcher {
    fn dispatch(&self, command: &str) -> DispatchRecord {
        let record = DispatchRecord::new(command);
        info!("Dry run, not executing [{}]: {}", record.id, record.command);
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        record
    }
}
