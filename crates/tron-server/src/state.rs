use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tron_lib::lobby::{self, GamePhase};
use tron_lib::player::Color;
use tron_lib::PlayerId;

use crate::broker::{BrokerError, BrokerResult};
use crate::color_pool::ColorPool;

/// Queue of encoded lines waiting to be written to a player's socket.
pub type Outbox = mpsc::Sender<Bytes>;

#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub color: Color,
    pub ready: bool,
    outbox: Outbox,
    reader: Option<JoinHandle<()>>,
}

impl Drop for Player {
    fn drop(&mut self) {
        // The outbox closes with us, which ends the writer task. The reader would otherwise
        // stay blocked on the socket.
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Everything known about the running session. Owned by the broker alone.
#[derive(Debug)]
pub struct Session {
    /// In join order
    players: Vec<Player>,
    colors: ColorPool,
    phase: GamePhase,
    next_id: u32,
}

impl Session {
    pub fn new(colors: Vec<Color>) -> Self {
        Self {
            players: Vec::new(),
            colors: ColorPool::new(colors),
            phase: GamePhase::Lobby,
            next_id: 0,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// Move from the lobby into the game. Returns false if the game had already started.
    pub fn start_game(&mut self) -> bool {
        match self.phase {
            GamePhase::Lobby => {
                self.phase = GamePhase::InGame;
                true
            }
            GamePhase::InGame => false,
        }
    }

    /// Register a new player and give them the next free color.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NoColorAvailable`] when every color is taken. Nothing is changed
    /// in that case.
    pub fn add_player(&mut self, outbox: Outbox) -> BrokerResult<(PlayerId, Color)> {
        let color = self
            .colors
            .allocate()
            .ok_or(BrokerError::NoColorAvailable)?;
        let id = PlayerId(self.next_id);
        self.next_id += 1;

        self.players.push(Player {
            id,
            color: color.clone(),
            ready: false,
            outbox,
            reader: None,
        });
        Ok((id, color))
    }

    /// Tie the lifetime of a player's reader task to the player.
    pub fn attach_reader(&mut self, id: PlayerId, reader: JoinHandle<()>) -> BrokerResult<()> {
        let player = self.player_mut(id).ok_or(BrokerError::PlayerInvalid(id))?;
        player.reader = Some(reader);
        Ok(())
    }

    /// Remove a player and put their color back in the pool.
    pub fn remove_player(&mut self, id: PlayerId) -> BrokerResult<Player> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(BrokerError::PlayerInvalid(id))?;
        let player = self.players.remove(index);
        self.colors.release(&player.color);
        Ok(player)
    }

    /// Drop every player, closing their connections.
    pub fn clear(&mut self) {
        for player in self.players.drain(..) {
            self.colors.release(&player.color);
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn available_colors(&self) -> usize {
        self.colors.available()
    }

    /// True when at least two players are connected and all of them are ready.
    pub fn quorum_reached(&self) -> bool {
        lobby::quorum_reached(self.players.iter().map(|p| p.ready))
    }

    /// Colors of every player, in join order.
    pub fn colors(&self) -> Vec<Color> {
        self.players.iter().map(|p| p.color.clone()).collect()
    }

    /// Queue `frame` for a single player without waiting on their socket.
    pub fn send_to(&self, id: PlayerId, frame: Bytes) -> BrokerResult<()> {
        let player = self.player(id).ok_or(BrokerError::PlayerInvalid(id))?;
        Self::queue(player, frame)
    }

    /// Queue `frame` for every player except `except`.
    ///
    /// Returns the players whose outbox could not take the frame. Those players are not
    /// removed here.
    pub fn broadcast(&self, frame: &Bytes, except: Option<PlayerId>) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| Some(p.id) != except)
            .filter_map(|p| Self::queue(p, frame.clone()).err().map(|_| p.id))
            .collect()
    }

    fn queue(player: &Player, frame: Bytes) -> BrokerResult<()> {
        match player.outbox.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(BrokerError::PeerLagging(player.id)),
            Err(TrySendError::Closed(_)) => Err(BrokerError::PeerClosed(player.id)),
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use tokio::sync::mpsc;
    use tron_lib::lobby::GamePhase;
    use tron_lib::player::Color;

    use super::Session;
    use crate::broker::BrokerError;

    fn setup() -> Session {
        Session::new(Color::defaults())
    }

    fn color(s: &str) -> Color {
        s.parse().unwrap()
    }

    #[test]
    fn add_player() {
        let mut session = setup();
        let (tx, _rx) = mpsc::channel(4);

        let (id_0, color_0) = session.add_player(tx.clone()).unwrap();
        let (id_1, color_1) = session.add_player(tx.clone()).unwrap();
        let (id_2, _) = session.add_player(tx.clone()).unwrap();
        assert_eq!(id_0, 0);
        assert_eq!(id_1, 1);
        assert_eq!(id_2, 2);
        assert_eq!(color_0, color("#ff0000"));
        assert_eq!(color_1, color("#00ff00"));
        assert!(!session.player(id_0).unwrap().ready);

        // Out of colors
        assert!(matches!(
            session.add_player(tx),
            Err(BrokerError::NoColorAvailable)
        ));
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut session = setup();
        let (tx, _rx) = mpsc::channel(4);

        let (id_0, _) = session.add_player(tx.clone()).unwrap();
        session.remove_player(id_0).unwrap();
        let (id_1, color_1) = session.add_player(tx).unwrap();
        assert_ne!(id_0, id_1);
        // The color freed by the first player went to the back of the pool
        assert_eq!(color_1, color("#00ff00"));
    }

    #[test]
    fn remove_player() {
        let mut session = setup();
        let (tx, _rx) = mpsc::channel(4);
        let (id_0, _) = session.add_player(tx.clone()).unwrap();
        let (id_1, _) = session.add_player(tx).unwrap();
        assert_eq!(session.available_colors(), 1);

        let removed = session.remove_player(id_0).unwrap();
        assert_eq!(removed.color, color("#ff0000"));
        assert_eq!(session.available_colors(), 2);
        assert!(session.player(id_0).is_none());
        assert_eq!(session.colors(), vec![color("#00ff00")]);

        assert!(matches!(
            session.remove_player(id_0),
            Err(BrokerError::PlayerInvalid(_))
        ));
        session.remove_player(id_1).unwrap();
        assert!(session.is_empty());
        assert_eq!(session.available_colors(), 3);
    }

    #[test]
    fn quorum() {
        let mut session = setup();
        let (tx, _rx) = mpsc::channel(4);

        let (id_0, _) = session.add_player(tx.clone()).unwrap();
        session.player_mut(id_0).unwrap().ready = true;
        assert!(!session.quorum_reached());

        let (id_1, _) = session.add_player(tx).unwrap();
        assert!(!session.quorum_reached());
        session.player_mut(id_1).unwrap().ready = true;
        assert!(session.quorum_reached());
    }

    #[test]
    fn phase_only_moves_forward() {
        let mut session = setup();
        assert_eq!(session.phase(), GamePhase::Lobby);
        assert!(session.start_game());
        assert_eq!(session.phase(), GamePhase::InGame);
        assert!(!session.start_game());
        assert_eq!(session.phase(), GamePhase::InGame);
    }

    #[test]
    fn broadcast_skips_sender() {
        let mut session = setup();
        let (tx_0, mut rx_0) = mpsc::channel(4);
        let (tx_1, mut rx_1) = mpsc::channel(4);
        let (id_0, _) = session.add_player(tx_0).unwrap();
        session.add_player(tx_1).unwrap();

        let frame = Bytes::from_static(b"hello");
        assert!(session.broadcast(&frame, Some(id_0)).is_empty());
        assert_eq!(rx_1.try_recv().unwrap(), frame);
        assert!(rx_0.try_recv().is_err());

        assert!(session.broadcast(&frame, None).is_empty());
        assert_eq!(rx_0.try_recv().unwrap(), frame);
        assert_eq!(rx_1.try_recv().unwrap(), frame);
    }

    #[test]
    fn broadcast_reports_unavailable_peers() {
        let mut session = setup();
        let (tx_0, rx_0) = mpsc::channel(4);
        let (tx_1, _rx_1) = mpsc::channel(1);
        let (tx_2, mut rx_2) = mpsc::channel(4);
        let (id_0, _) = session.add_player(tx_0).unwrap();
        let (id_1, _) = session.add_player(tx_1).unwrap();
        session.add_player(tx_2).unwrap();

        // Player 0's writer is gone, player 1 isn't keeping up
        drop(rx_0);
        let frame = Bytes::from_static(b"tick");
        session.send_to(id_1, frame.clone()).unwrap();
        assert!(matches!(
            session.send_to(id_1, frame.clone()),
            Err(BrokerError::PeerLagging(_))
        ));

        assert_eq!(session.broadcast(&frame, None), vec![id_0, id_1]);
        // Other players are unaffected
        assert_eq!(rx_2.try_recv().unwrap(), frame);
    }
}
