use serde::Serialize;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    time::Interval,
};
use tracing::{debug, info};

/// Where the running cycle is. `Idle` between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    FetchingQuotes,
    Analyzing,
    Enriching,
    Ranking,
    Publishing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Queued,
    /// A trigger is already waiting; this one was folded into it.
    AlreadyPending,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Tick,
    Triggered,
    Stop,
}

/// Cloneable control surface given to the API and to `main`.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    stop_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<CycleState>,
}

/// The loop's side of the channels. Owned by the orchestrator only.
pub struct SchedulerControl {
    trigger_rx: mpsc::Receiver<()>,
    stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<CycleState>,
}

pub fn scheduler_channel() -> (SchedulerHandle, SchedulerControl) {
    // Capacity one: at most one on-demand cycle can be pending.
    let (trigger_tx, trigger_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(CycleState::Idle);

    (
        SchedulerHandle {
            trigger_tx,
            stop_tx: Arc::new(stop_tx),
            state_rx,
        },
        SchedulerControl {
            trigger_rx,
            stop_rx,
            state_tx,
        },
    )
}

impl SchedulerHandle {
    pub fn trigger(&self) -> TriggerOutcome {
        if *self.stop_tx.borrow() {
            return TriggerOutcome::Stopped;
        }
        match self.trigger_tx.try_send(()) {
            Ok(()) => {
                debug!("On-demand cycle queued");
                TriggerOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(())) => TriggerOutcome::AlreadyPending,
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Stopped,
        }
    }

    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!("Stop requested");
        }
    }

    pub fn state(&self) -> CycleState {
        *self.state_rx.borrow()
    }
}

impl SchedulerControl {
    /// Waits for the next reason to run a cycle. A stop request wins over
    /// everything else.
    pub async fn next_wake(&mut self, interval: &mut Interval) -> Wake {
        if self.is_stopped() {
            return Wake::Stop;
        }

        tokio::select! {
            biased;

            changed = self.stop_rx.changed() => {
                // A dropped handle also ends the loop.
                if changed.is_err() || *self.stop_rx.borrow() {
                    Wake::Stop
                } else {
                    Wake::Tick
                }
            }
            trigger = self.trigger_rx.recv() => match trigger {
                Some(()) => Wake::Triggered,
                None => Wake::Stop,
            },
            _ = interval.tick() => Wake::Tick,
        }
    }

    /// A pending trigger is satisfied by the cycle that is about to start.
    pub fn absorb_pending_trigger(&mut self) {
        let _ = self.trigger_rx.try_recv();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    pub fn set_state(&self, state: CycleState) {
        self.state_tx.send_replace(state);
    }
}
