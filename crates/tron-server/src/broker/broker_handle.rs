use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tron_lib::PlayerId;

use super::{BrokerAction, BrokerError, BrokerResult};

/// Sending side of the broker's queue, used by the listener and the ticker.
#[derive(Clone, Debug)]
pub struct BrokerHandle {
    sender: mpsc::Sender<BrokerAction>,
}

impl BrokerHandle {
    pub(crate) fn new(sender: mpsc::Sender<BrokerAction>) -> Self {
        Self { sender }
    }

    async fn execute(&self, action: BrokerAction) -> BrokerResult<()> {
        self.sender
            .send(action)
            .await
            .map_err(|_| BrokerError::HandleInvalid)
    }

    /// Hand a freshly accepted connection to the broker.
    pub async fn admit(&self, socket: TcpStream, addr: SocketAddr) -> BrokerResult<()> {
        self.execute(BrokerAction::Admit { socket, addr }).await
    }

    /// Ask the broker to broadcast a tick. Never waits: a tick is skipped if the broker is
    /// backed up.
    pub fn request_tick(&self) -> BrokerResult<()> {
        match self.sender.try_send(BrokerAction::Tick) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Broker is busy, skipping tick");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(BrokerError::HandleInvalid),
        }
    }

    pub fn player(&self, player_id: PlayerId) -> PlayerHandle {
        PlayerHandle {
            sender: self.sender.clone(),
            player_id,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.sender.downgrade(),
        }
    }
}

/// Used by a player's reader to forward what the player sends.
#[derive(Debug)]
pub struct PlayerHandle {
    sender: mpsc::Sender<BrokerAction>,
    player_id: PlayerId,
}

impl PlayerHandle {
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub async fn message(&self, line: Bytes) -> BrokerResult<()> {
        self.sender
            .send(BrokerAction::Message {
                id: self.player_id,
                line,
            })
            .await
            .map_err(|_| BrokerError::HandleInvalid)
    }

    /// Tell the broker this player's connection is gone.
    pub async fn disconnect(self) -> BrokerResult<()> {
        self.sender
            .send(BrokerAction::Disconnect { id: self.player_id })
            .await
            .map_err(|_| BrokerError::HandleInvalid)
    }
}

/// Requests an external stop of a session. Does not keep the session alive on its own.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    sender: mpsc::WeakSender<BrokerAction>,
}

impl ShutdownHandle {
    pub async fn stop(&self) {
        let Some(sender) = self.sender.upgrade() else {
            tracing::debug!("Session already closed");
            return;
        };
        let _ = sender.send(BrokerAction::Stop).await;
    }
}
