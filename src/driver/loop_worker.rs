use anyhow::{anyhow, Context, Result};
use std::{
    thread,
    time::{Duration, Instant},
};
use tokio::{
    sync::{oneshot, watch},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{gesture::Detection, source::DetectionSource, tracker::GestureController};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(30);

/// Timer-driven loop: every tick samples the latest detection published by
/// the feeder and runs it through the controller.
pub async fn interval_loop(
    mut controller: GestureController,
    mut detections: watch::Receiver<Detection>,
    feeder_done: oneshot::Receiver<Result<()>>,
    tick_interval: Duration,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if detections.has_changed().is_err() {
                    log_info!("detection source exhausted after {} ticks", ticks);
                    break;
                }
                let detection = *detections.borrow_and_update();
                controller.on_detection(&detection, Instant::now());
                ticks = ticks.wrapping_add(1);
            }
            _ = cancel_token.cancelled() => {
                log_info!("interval driver shutting down after {} ticks", ticks);
                return Ok(());
            }
        }
    }

    match feeder_done.await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("detection feeder vanished without reporting")),
    }
}

/// Pull detections on a dedicated thread and publish the most recent one.
///
/// The thread is detached: a source blocked in a read must not hold up
/// shutdown. It exits on exhaustion, on error, on cancellation, or once every
/// receiver is gone.
pub fn spawn_feeder(
    mut source: Box<dyn DetectionSource>,
    cancel_token: CancellationToken,
) -> Result<(watch::Receiver<Detection>, oneshot::Receiver<Result<()>>)> {
    let (tx, rx) = watch::channel(Detection::none());
    let (done_tx, done_rx) = oneshot::channel();

    thread::Builder::new()
        .name("detection-feeder".to_string())
        .spawn(move || {
            let result = loop {
                if cancel_token.is_cancelled() || tx.is_closed() {
                    break Ok(());
                }
                match source.next_detection() {
                    Ok(Some(detection)) => {
                        tx.send_replace(detection);
                    }
                    Ok(None) => break Ok(()),
                    Err(err) => {
                        log_error!("detection source failed: {err:?}");
                        break Err(err);
                    }
                }
            };
            drop(tx);
            let _ = done_tx.send(result);
        })
        .context("failed to spawn detection feeder thread")?;

    Ok((rx, done_rx))
}

/// Frame-capture loop: each blocking read paces the next tick.
pub fn blocking_loop(
    mut controller: GestureController,
    mut source: Box<dyn DetectionSource>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut frames: u64 = 0;
    while !cancel_token.is_cancelled() {
        let Some(detection) = source
            .next_detection()
            .context("detection source failed")?
        else {
            log_info!("detection source exhausted after {} frames", frames);
            return Ok(());
        };
        controller.on_detection(&detection, Instant::now());
        frames = frames.wrapping_add(1);
    }
    log_warn!("blocking driver cancelled after {} frames", frames);
    Ok(())
}
