use crate::store::ResponseStore;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a periodic sweep task. Dropping it leaves the task running until the store is
/// closed; call [`SweeperHandle::stop`] to end it early.
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stops the task and waits for an in-progress sweep to finish.
    pub async fn join(self) {
        self.stop();
        if let Err(err) = self.task.await {
            log::warn!("response sweeper task ended abnormally: {err}");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ResponseStore {
    /// Sweeps every `interval` until stopped or the store is closed.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let store = self.clone();
        let mut closed = self.subscribe_shutdown();
        let (stop, mut stop_rx) = watch::channel(false);
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = store.sweep(SystemTime::now()).await {
                            log::warn!("response sweep failed: {err}");
                        }
                    }
                    changed = closed.changed() => {
                        if changed.is_err() || *closed.borrow() { break; }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() { break; }
                    }
                }
            }
            log::debug!("response sweeper stopped");
        });

        SweeperHandle { stop, task }
    }
}
