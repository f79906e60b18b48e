//! Tokio channel-based transport for in-process servers
//!
//! [`ChannelConnector::pair`] returns a connector plus a [`ChannelServer`]
//! handle. Every successful `connect` hands a [`ServerConnection`] to the
//! server side, which scripts the platform's replies frame by frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use super::{Connector, Frame, FrameReader, FrameWriter, Link};
use crate::error::TransportError;

/// Connector whose connections terminate in a [`ChannelServer`]
#[derive(Clone)]
pub struct ChannelConnector {
    accept_tx: mpsc::UnboundedSender<ServerConnection>,
    accepting: Arc<AtomicBool>,
    attempts: Arc<Mutex<Vec<Url>>>,
}

impl ChannelConnector {
    /// Create a connector and the server handle that receives its connections
    pub fn pair() -> (Self, ChannelServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let accepting = Arc::new(AtomicBool::new(true));
        let attempts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                accept_tx,
                accepting: accepting.clone(),
                attempts: attempts.clone(),
            },
            ChannelServer {
                accept_rx,
                accepting,
                attempts,
            },
        )
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, url: &Url) -> Result<Link, TransportError> {
        self.attempts.lock().push(url.clone());
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("{} refused connection", url)));
        }

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let connection = ServerConnection {
            url: url.clone(),
            incoming: client_rx,
            outgoing: server_tx,
        };
        self.accept_tx
            .send(connection)
            .map_err(|_| TransportError::Connect("server handle dropped".to_string()))?;

        Ok(Link {
            writer: Box::new(ChannelWriter { tx: client_tx }),
            reader: Box::new(ChannelReader { rx: server_rx }),
        })
    }
}

struct ChannelWriter {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn next(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Server side of a [`ChannelConnector`]
pub struct ChannelServer {
    accept_rx: mpsc::UnboundedReceiver<ServerConnection>,
    accepting: Arc<AtomicBool>,
    attempts: Arc<Mutex<Vec<Url>>>,
}

impl ChannelServer {
    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accept_rx.recv().await
    }

    /// Refuse (`false`) or allow (`true`) further connection attempts
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Every url the client tried, in order, including refused attempts
    pub fn attempts(&self) -> Vec<Url> {
        self.attempts.lock().clone()
    }
}

/// One accepted client connection, driven by the test server
pub struct ServerConnection {
    url: Url,
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl ServerConnection {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.outgoing.send(Frame::Text(text.into()));
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.outgoing.send(Frame::Binary(bytes.into()));
    }

    /// Send a close frame; the client treats it as a lost connection
    pub fn close(&self) {
        let _ = self.outgoing.send(Frame::Close);
    }

    /// Next text frame sent by the client
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Play the platform side of the socket.io handshake and return the
    /// auth frame the client sent. `successauth` arrives as a binary event,
    /// the way the platform sends it.
    pub async fn accept_handshake(&mut self) -> Option<String> {
        self.send_text(r#"0{"sid":"srv","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);
        if self.recv().await? != "40" {
            return None;
        }
        self.send_text(r#"40{"sid":"ns"}"#);
        let auth = self.recv().await?;
        self.send_text(r#"451-["successauth",{"_placeholder":true,"num":0}]"#);
        self.send_binary(br#"{"id":"srv"}"#.to_vec());
        Some(auth)
    }

    /// Reject the auth frame
    pub async fn reject_handshake(&mut self) -> Option<String> {
        self.send_text(r#"0{"sid":"srv"}"#);
        self.recv().await?;
        self.send_text(r#"40{"sid":"ns"}"#);
        let auth = self.recv().await?;
        self.send_text(r#"42["NotAuthorized"]"#);
        Some(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("ws://server.test/socket.io/").unwrap()
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut server) = ChannelConnector::pair();
        let mut link = connector.connect(&url()).await.unwrap();
        let mut conn = server.accept().await.unwrap();

        link.writer.send("40".to_string()).await.unwrap();
        assert_eq!(conn.recv().await.as_deref(), Some("40"));

        conn.send_text("2");
        conn.send_binary(vec![1, 2, 3]);
        assert_eq!(link.reader.next().await, Some(Ok(Frame::Text("2".to_string()))));
        assert_eq!(link.reader.next().await, Some(Ok(Frame::Binary(vec![1, 2, 3]))));

        drop(conn);
        assert_eq!(link.reader.next().await, None);
        assert_eq!(link.writer.send("3".to_string()).await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_refusing_connections() {
        let (connector, server) = ChannelConnector::pair();
        server.set_accepting(false);

        assert!(matches!(
            connector.connect(&url()).await,
            Err(TransportError::Connect(_))
        ));
        assert_eq!(server.attempts(), vec![url()]);
    }
}
