//! Lobby and session server for a multiplayer Tron game.
//!
//! Clients connect over TCP and exchange newline delimited JSON messages. Right after
//! connecting a client is told its color:
//!
//! ```text
//! {"type":"connect","color":"#ff0000"}
//! ```
//!
//! While in the lobby clients may chat, which is relayed to every other player, or declare
//! themselves ready. Once at least two players are connected and all of them are ready, the
//! server sends the colors of every player in join order:
//!
//! ```text
//! {"type":"start_game","colors":["#ff0000","#00ff00"]}
//! ```
//!
//! Any player may then send `{"type":"start"}`, after which `{"type":"tick"}` is sent to every
//! player at a fixed interval. Player events are relayed to the other players as they arrive.
//! The game itself runs on the clients. The session ends when the last player disconnects.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::broker::{BrokerActor, BrokerHandle};

pub use crate::broker::ShutdownHandle;
pub use crate::config::ServerConfig;

mod broker;
mod client;
mod color_pool;
pub mod config;
mod listener;
mod state;
mod ticker;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// A fresh session waiting to be started.
#[derive(Debug, Default)]
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Start listening on `port` without accepting anyone yet. Port 0 picks a free port.
    pub async fn bind(self, port: u16) -> Result<BoundServer, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let (actor, handle, listener_stop) = broker::open_session(&self.config);
        Ok(BoundServer {
            listener,
            actor,
            handle,
            listener_stop,
        })
    }

    /// Serve a single session on `port`. Returns once the session is over, which happens when
    /// the last player leaves.
    pub async fn run(self, port: u16) -> Result<(), ServerError> {
        self.bind(port).await?.run().await;
        Ok(())
    }
}

pub struct BoundServer {
    listener: TcpListener,
    actor: BrokerActor,
    handle: BrokerHandle,
    listener_stop: oneshot::Receiver<()>,
}

impl BoundServer {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.shutdown_handle()
    }

    /// Accept players and run the session until it tears itself down or is stopped.
    pub async fn run(self) {
        let listener = tokio::spawn(listener::run(
            self.listener,
            self.handle,
            self.listener_stop,
        ));
        self.actor.run().await;

        if let Err(e) = listener.await {
            tracing::error!("Listener task failed: {e}");
        }
        tracing::info!("Server shutdown");
    }
}
