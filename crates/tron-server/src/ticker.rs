use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::instrument;

use crate::broker::BrokerHandle;

/// Background task asking the broker for a tick broadcast at a fixed interval.
///
/// The ticker never touches the session itself; each tick is just a request on the broker's
/// queue.
#[derive(Debug)]
pub struct Ticker {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Ticker {
    pub fn start(broker: BrokerHandle, period: Duration) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(run(broker, period, stopped));
        Self { stop, task }
    }

    /// Signal the ticker and wait for it to finish. It stops at the latest one interval later.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Ticker task failed: {e}");
        }
    }
}

#[instrument(skip_all)]
async fn run(broker: BrokerHandle, period: Duration, mut stopped: oneshot::Receiver<()>) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Also fires if the ticker was dropped without being stopped
            _ = &mut stopped => break,
            _ = interval.tick() => {}
        }
        if broker.request_tick().is_err() {
            break;
        }
    }
    tracing::debug!("Ticker finished");
}
