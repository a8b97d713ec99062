use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tron_lib::net::{ProtocolError, ServerMessage};
use tron_lib::PlayerId;

use crate::config::ServerConfig;

pub use self::broker_actor::{BrokerAction, BrokerActor};
pub use self::broker_handle::{BrokerHandle, PlayerHandle, ShutdownHandle};

mod broker_actor;
mod broker_handle;

/// Queue depth between the connection tasks and the broker.
const BROKER_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection rejected, no color available")]
    NoColorAvailable,
    #[error("Action attempted by Player {0:#} who is not in this session")]
    PlayerInvalid(PlayerId),
    #[error("Player {0:#} is not keeping up with outgoing messages")]
    PeerLagging(PlayerId),
    #[error("Connection to Player {0:#} is closed")]
    PeerClosed(PlayerId),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("The Broker Handle is no longer connected to a session.")]
    HandleInvalid,
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Create the broker for a new session.
///
/// The returned receiver is signalled once the session wants no more connections; it belongs
/// to the listener.
pub fn open_session(config: &ServerConfig) -> (BrokerActor, BrokerHandle, oneshot::Receiver<()>) {
    let (sender, receiver) = mpsc::channel(BROKER_CAPACITY);
    let (listener_stop, listener_stopped) = oneshot::channel();
    let actor = BrokerActor::new(receiver, sender.downgrade(), config, Some(listener_stop));
    (actor, BrokerHandle::new(sender), listener_stopped)
}

fn encode(message: &ServerMessage) -> BrokerResult<Bytes> {
    Ok(serde_json::to_vec(message)?.into())
}
