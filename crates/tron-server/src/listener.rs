use std::io;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::instrument;

use crate::broker::BrokerHandle;

/// Pause after a failed accept, so a persistent error (e.g. out of file descriptors) doesn't
/// spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections and hand each one to the broker until told to stop.
///
/// Accept errors are logged and accepting continues after a short pause. The loop also ends if
/// the stop sender is dropped or the broker is gone.
#[instrument(skip_all)]
pub async fn run(listener: TcpListener, broker: BrokerHandle, mut stop: oneshot::Receiver<()>) {
    tracing::info!("Start hosting server");
    loop {
        let accepted = tokio::select! {
            biased;
            _ = &mut stop => {
                tracing::info!("Stop listening");
                break;
            }
            accepted = listener.accept() => accepted,
        };
        let Some((socket, addr)) = backoff_on_error(accepted).await else {
            continue;
        };

        tracing::info!("Serving {addr}");
        if broker.admit(socket, addr).await.is_err() {
            tracing::info!("Session closed, stop listening");
            break;
        }
    }
}

async fn backoff_on_error<T>(accepted: io::Result<T>) -> Option<T> {
    match accepted {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            tracing::error!("Error while listening: {e}");
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}
