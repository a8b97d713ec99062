use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::instrument;
use tron_lib::net::connection::{ConnectionRx, ConnectionTx};
use tron_lib::PlayerId;

use crate::broker::PlayerHandle;

/// Lines a player may have waiting to be written before they count as lagging.
pub const OUTBOX_CAPACITY: usize = 256;

/// Forward every line a player sends to the broker until their connection ends, then report
/// the disconnect.
#[instrument(skip_all, fields(player_id = %handle.player_id()))]
pub async fn read_task(mut conn_rx: ConnectionRx, handle: PlayerHandle) {
    loop {
        let line = match conn_rx.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("Player closed the connection");
                break;
            }
            Err(e) => {
                tracing::error!("Error reading message, Closing connection\n{e:?}");
                break;
            }
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        tracing::debug!("Received message: {}", String::from_utf8_lossy(&line));
        if handle.message(line).await.is_err() {
            // The session is gone, nobody is left to tell about the disconnect
            return;
        }
    }

    let _ = handle.disconnect().await;
}

/// Write queued lines to a player's socket. Ends when the outbox closes or a write fails;
/// either way the broker notices through the closed outbox.
#[instrument(skip(conn_tx, outbox))]
pub async fn send_task(
    mut conn_tx: ConnectionTx,
    mut outbox: mpsc::Receiver<Bytes>,
    player_id: PlayerId,
) {
    while let Some(line) = outbox.recv().await {
        if let Err(e) = conn_tx.write_line(&line).await {
            tracing::warn!("Error writing to player: {e}");
            return;
        }
    }
}
