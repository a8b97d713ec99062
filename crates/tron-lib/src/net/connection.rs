use bytes::{Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::{io::AsyncReadExt, io::AsyncWriteExt, io::BufWriter, net::TcpStream};

use super::FrameError;

/// Longest line, excluding the terminating newline, either side will accept.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

pub fn from_socket(socket: TcpStream) -> (ConnectionTx, ConnectionRx) {
    let (read_stream, write_stream) = socket.into_split();

    (
        ConnectionTx {
            write_stream: BufWriter::new(write_stream),
        },
        ConnectionRx {
            read_stream,
            buffer: BytesMut::with_capacity(256),
        },
    )
}

#[derive(Debug)]
pub struct ConnectionTx {
    write_stream: BufWriter<OwnedWriteHalf>,
}

#[derive(Debug)]
pub struct ConnectionRx {
    read_stream: OwnedReadHalf,
    buffer: BytesMut,
}

impl ConnectionTx {
    /// Write `line` followed by a newline. `line` must not contain a newline itself.
    pub async fn write_line(&mut self, line: &[u8]) -> Result<(), FrameError> {
        if line.len() > MAX_LINE_LENGTH {
            return Err(FrameError::FrameLength);
        }
        self.write_stream.write_all(line).await?;
        self.write_stream.write_all(b"\n").await?;
        self.write_stream.flush().await?;
        Ok(())
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), FrameError> {
        let line = serde_json::to_vec(message)?;
        self.write_line(&line).await
    }
}

impl ConnectionRx {
    /// Read the next line, without its line terminator.
    ///
    /// Returns `Ok(None)` when the remote closed the connection between lines.
    pub async fn read_line(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            if let Some(line) = self.parse_line()? {
                tracing::trace!(len = line.len(), "Read line");
                return Ok(Some(line));
            }

            if self.read_stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    // Remote closed Connection
                    return Ok(None);
                } else {
                    // Connection closed while still sending data
                    return Err(FrameError::ConnectionReset);
                }
            }
        }
    }

    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        match self.read_line().await? {
            Some(line) => Ok(Some(serde_json::from_slice(&line)?)),
            None => Ok(None),
        }
    }

    fn parse_line(&mut self) -> Result<Option<Bytes>, FrameError> {
        let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(FrameError::FrameLength);
            }
            return Ok(None);
        };
        if end > MAX_LINE_LENGTH {
            return Err(FrameError::FrameLength);
        }

        // Consume the line and its terminator from the buffer
        let mut line = self.buffer.split_to(end + 1).freeze();
        line.truncate(end);
        if line.ends_with(b"\r") {
            line.truncate(end - 1);
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod test {
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::{from_socket, MAX_LINE_LENGTH};
    use crate::net::{FrameError, ServerMessage};

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn lines_are_split() {
        let (mut client, server) = socket_pair().await;
        let (_tx, mut rx) = from_socket(server);

        client.write_all(b"first\nsec").await.unwrap();
        client.write_all(b"ond\r\nthird\n").await.unwrap();
        drop(client);

        assert_eq!(rx.read_line().await.unwrap().unwrap(), &b"first"[..]);
        assert_eq!(rx.read_line().await.unwrap().unwrap(), &b"second"[..]);
        assert_eq!(rx.read_line().await.unwrap().unwrap(), &b"third"[..]);
        assert!(rx.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_mid_line() {
        let (mut client, server) = socket_pair().await;
        let (_tx, mut rx) = from_socket(server);

        client.write_all(b"{\"type\":").await.unwrap();
        drop(client);

        assert!(matches!(
            rx.read_line().await,
            Err(FrameError::ConnectionReset)
        ));
    }

    #[tokio::test]
    async fn line_too_long() {
        let (mut client, server) = socket_pair().await;
        let (_tx, mut rx) = from_socket(server);

        let writer = tokio::spawn(async move {
            let long = vec![b'a'; MAX_LINE_LENGTH + 2];
            // The reader may give up and close before everything is written
            let _ = client.write_all(&long).await;
            client
        });

        assert!(matches!(rx.read_line().await, Err(FrameError::FrameLength)));
        drop(rx);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn write_and_read_messages() {
        let (client, server) = socket_pair().await;
        let (mut server_tx, _server_rx) = from_socket(server);
        let (_client_tx, mut client_rx) = from_socket(client);

        server_tx.write_message(&ServerMessage::Tick).await.unwrap();
        server_tx.write_line(br#"{"type":"tick"}"#).await.unwrap();

        let line = client_rx.read_line().await.unwrap().unwrap();
        assert_eq!(line, &br#"{"type":"tick"}"#[..]);
        let message = client_rx.read_message::<ServerMessage>().await.unwrap();
        assert_eq!(message, Some(ServerMessage::Tick));
    }

    #[tokio::test]
    async fn refuses_to_write_oversized_line() {
        let (_client, server) = socket_pair().await;
        let (mut tx, _rx) = from_socket(server);

        let long = vec![b'a'; MAX_LINE_LENGTH + 1];
        assert!(matches!(
            tx.write_line(&long).await,
            Err(FrameError::FrameLength)
        ));
    }
}
