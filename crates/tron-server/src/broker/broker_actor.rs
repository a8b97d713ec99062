use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;
use tron_lib::lobby::GamePhase;
use tron_lib::net::{connection, GameMessage, LobbyMessage, ServerMessage};
use tron_lib::PlayerId;

use crate::client;
use crate::config::ServerConfig;
use crate::state::{Outbox, Session};
use crate::ticker::Ticker;

use super::{encode, BrokerError, BrokerHandle, BrokerResult};

/// Owns the session and applies every change to it, one action at a time.
pub struct BrokerActor {
    receiver: mpsc::Receiver<BrokerAction>,
    handle: mpsc::WeakSender<BrokerAction>,
    session: Session,
    ticking: Ticking,
    tick_interval: Duration,
    listener_stop: Option<oneshot::Sender<()>>,
    open: bool,
}

#[derive(Debug)]
pub enum BrokerAction {
    Admit { socket: TcpStream, addr: SocketAddr },
    Message { id: PlayerId, line: Bytes },
    Disconnect { id: PlayerId },
    Tick,
    Stop,
}

#[derive(Debug)]
enum Ticking {
    Idle,
    Running(Ticker),
}

impl BrokerActor {
    pub fn new(
        receiver: mpsc::Receiver<BrokerAction>,
        handle: mpsc::WeakSender<BrokerAction>,
        config: &ServerConfig,
        listener_stop: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            receiver,
            handle,
            session: Session::new(config.colors.clone()),
            ticking: Ticking::Idle,
            tick_interval: config.tick_interval,
            listener_stop,
            open: true,
        }
    }

    #[instrument(skip_all)]
    pub async fn run(mut self) {
        tracing::info!(
            "Session opened with room for {} players",
            self.session.available_colors()
        );
        while let Some(action) = self.receiver.recv().await {
            let result = match action {
                BrokerAction::Admit { socket, addr } => self.admit(socket, addr).map(|_| ()),
                BrokerAction::Message { id, line } => self.handle_message(id, &line),
                BrokerAction::Disconnect { id } => self.rem_player(id),
                BrokerAction::Tick => self.broadcast_tick(),
                BrokerAction::Stop => {
                    tracing::info!("Stop requested");
                    break;
                }
            };
            if let Err(e) = result {
                tracing::warn!("{e}");
            }
            if !self.open {
                break;
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(mut self) {
        tracing::info!("Initiating shutdown");
        if let Ticking::Running(ticker) = std::mem::replace(&mut self.ticking, Ticking::Idle) {
            ticker.stop().await;
            tracing::info!("Ticking stopped");
        }
        self.stop_listening();

        // Connections still waiting for admission are closed when dropped
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}

        self.session.clear();
        tracing::info!("Session closed");
    }

    fn stop_listening(&mut self) {
        if let Some(stop) = self.listener_stop.take() {
            tracing::info!("No longer accepting connections");
            let _ = stop.send(());
        }
    }

    /// Queue a message for one player. A player who can't take it is disconnected.
    fn send_to(&mut self, id: PlayerId, message: &ServerMessage) -> BrokerResult<()> {
        match self.session.send_to(id, encode(message)?) {
            Err(e @ (BrokerError::PeerLagging(_) | BrokerError::PeerClosed(_))) => {
                tracing::warn!("{e}, disconnecting");
                self.rem_player(id)
            }
            result => result,
        }
    }

    /// Queue an already encoded line for everyone but `except`. Players who can't take it are
    /// disconnected.
    fn fan_out(&mut self, frame: Bytes, except: Option<PlayerId>) {
        for id in self.session.broadcast(&frame, except) {
            tracing::warn!(player_id = %id, "Outgoing queue unavailable, disconnecting");
            if let Err(e) = self.rem_player(id) {
                tracing::warn!("{e}");
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage, except: Option<PlayerId>) -> BrokerResult<()> {
        let frame = encode(message)?;
        self.fan_out(frame, except);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Action Handlers
// ----------------------------------------------------------------------------
impl BrokerActor {
    #[instrument(skip(self, socket))]
    fn admit(&mut self, socket: TcpStream, addr: SocketAddr) -> BrokerResult<PlayerId> {
        let sender = self.handle.upgrade().ok_or(BrokerError::HandleInvalid)?;
        let (conn_tx, conn_rx) = connection::from_socket(socket);
        let (outbox, outbox_rx) = mpsc::channel(client::OUTBOX_CAPACITY);

        // On error the connection halves are dropped here, which closes the socket
        let id = self.add_player(outbox)?;

        tokio::spawn(client::send_task(conn_tx, outbox_rx, id));
        let reader = tokio::spawn(client::read_task(
            conn_rx,
            BrokerHandle::new(sender).player(id),
        ));
        self.session.attach_reader(id, reader)?;
        Ok(id)
    }

    /// Registers a new player, tells them their color and announces them to everyone else.
    ///
    /// # Errors
    ///
    /// This function will return an error if every color is already taken.
    #[instrument(skip_all)]
    fn add_player(&mut self, outbox: Outbox) -> BrokerResult<PlayerId> {
        let (id, color) = self.session.add_player(outbox)?;
        tracing::info!(player_id = %id, "Client subscribed. Color: {color}");

        self.send_to(
            id,
            &ServerMessage::Connect {
                color: color.clone(),
            },
        )?;
        self.broadcast(
            &ServerMessage::Chat {
                message: format!("{color} has connected"),
                color,
            },
            Some(id),
        )?;
        Ok(id)
    }

    /// Removes a player and frees their color. When the last player leaves the session is
    /// closed.
    #[instrument(skip(self))]
    fn rem_player(&mut self, id: PlayerId) -> BrokerResult<()> {
        let player = self.session.remove_player(id)?;
        tracing::info!("Client with color {} unsubscribed", player.color);

        if self.session.is_empty() {
            tracing::info!("Last player left");
            self.open = false;
        }
        Ok(())
    }

    #[instrument(skip(self, line))]
    fn handle_message(&mut self, id: PlayerId, line: &Bytes) -> BrokerResult<()> {
        if self.session.player(id).is_none() {
            return Err(BrokerError::PlayerInvalid(id));
        }
        let line = trim(line);

        match self.session.phase() {
            GamePhase::Lobby => self.lobby_message(id, line),
            GamePhase::InGame => {
                // Nobody may join once the first in-game message arrives
                self.stop_listening();
                self.game_message(id, line)
            }
        }
    }

    fn lobby_message(&mut self, id: PlayerId, line: Bytes) -> BrokerResult<()> {
        match LobbyMessage::from_line(&line)? {
            LobbyMessage::Chat { .. } => {
                self.fan_out(line, Some(id));
                Ok(())
            }
            LobbyMessage::Ready => self.set_player_ready(id),
        }
    }

    fn game_message(&mut self, id: PlayerId, line: Bytes) -> BrokerResult<()> {
        match GameMessage::from_line(&line)? {
            GameMessage::Start => self.start_ticking(),
            GameMessage::PlayerEvent => {
                self.fan_out(line, Some(id));
                Ok(())
            }
        }
    }

    /// Marks a player as ready. Once every player is, the game starts.
    fn set_player_ready(&mut self, id: PlayerId) -> BrokerResult<()> {
        let player = self
            .session
            .player_mut(id)
            .ok_or(BrokerError::PlayerInvalid(id))?;
        player.ready = true;
        tracing::info!("Player is ready");

        if !self.session.quorum_reached() {
            return Ok(());
        }

        let colors = self.session.colors();
        tracing::info!("All {} players ready, starting game", colors.len());
        self.broadcast(&ServerMessage::StartGame { colors }, None)?;
        let started = self.session.start_game();
        debug_assert!(started, "game started twice");
        Ok(())
    }

    fn start_ticking(&mut self) -> BrokerResult<()> {
        if let Ticking::Running(_) = self.ticking {
            tracing::debug!("Ticker already running");
            return Ok(());
        }

        let sender = self.handle.upgrade().ok_or(BrokerError::HandleInvalid)?;
        self.ticking = Ticking::Running(Ticker::start(
            BrokerHandle::new(sender),
            self.tick_interval,
        ));
        tracing::info!("Ticker started with {} players", self.session.len());
        Ok(())
    }

    fn broadcast_tick(&mut self) -> BrokerResult<()> {
        if let Ticking::Idle = self.ticking {
            tracing::debug!("Ignoring tick while not ticking");
            return Ok(());
        }
        self.broadcast(&ServerMessage::Tick, None)
    }
}

/// Strip surrounding ASCII whitespace without copying.
fn trim(line: &Bytes) -> Bytes {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    line.slice(start..end)
}
