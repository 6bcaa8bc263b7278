use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::{thread, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{source::DetectionSource, tracker::GestureController};

use super::loop_worker::{blocking_loop, interval_loop, spawn_feeder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Sample the latest detection on a fixed timer.
    Interval { tick_interval: Duration },
    /// Tick once per frame, paced by the source's blocking read.
    Blocking,
}

enum DriverHandle {
    Task(JoinHandle<Result<()>>),
    Thread(oneshot::Receiver<Result<()>>),
}

impl DriverHandle {
    async fn join(self) -> Result<()> {
        match self {
            DriverHandle::Task(handle) => handle.await.context("driver task failed to join")?,
            DriverHandle::Thread(done) => done
                .await
                .map_err(|_| anyhow!("driver thread exited without reporting"))?,
        }
    }
}

/// Starts and stops one detection driver. Must be used inside a tokio runtime.
pub struct DriverController {
    handle: Option<DriverHandle>,
    cancel_token: Option<CancellationToken>,
}

impl DriverController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        kind: DriverKind,
        controller: GestureController,
        source: Box<dyn DetectionSource>,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("driver already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = match kind {
            DriverKind::Interval { tick_interval } => {
                info!("Starting interval driver ({}ms ticks)", tick_interval.as_millis());
                let (detections, feeder_done) = spawn_feeder(source, cancel_token.clone())?;
                DriverHandle::Task(tokio::spawn(interval_loop(
                    controller,
                    detections,
                    feeder_done,
                    tick_interval,
                    token_clone,
                )))
            }
            DriverKind::Blocking => {
                info!("Starting blocking driver");
                let (done_tx, done_rx) = oneshot::channel();
                thread::Builder::new()
                    .name("gesture-driver".to_string())
                    .spawn(move || {
                        let _ = done_tx.send(blocking_loop(controller, source, token_clone));
                    })
                    .context("failed to spawn blocking driver thread")?;
                DriverHandle::Thread(done_rx)
            }
        };

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Wait for the driver to finish on its own (source exhausted or failed).
    pub async fn wait(&mut self) -> Result<()> {
        let result = match self.handle.take() {
            Some(handle) => handle.join().await,
            None => Ok(()),
        };
        self.cancel_token = None;
        result
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle.join().await
        } else {
            Ok(())
        }
    }
}

impl Default for DriverController {
    fn default() -> Self {
        Self::new()
    }
}
