//! Turns transport frames into routable messages
//!
//! Binary socket.io events arrive in two frames: a `451-["name",
//! {"_placeholder":true,"num":0}]` header followed by the payload as a binary
//! frame. [`FrameAssembler`] holds the header until the payload arrives and
//! emits a single `42["name",payload]` message.

use pocket_core::message::{assemble_binary, binary_event_name};
use pocket_core::{FrameError, Packet, RawMessage};

use crate::transport::Frame;

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Engine.io ping; must be answered with `3`
    Ping,
    /// Engine.io / namespace control frame (open, connect, pong)
    Control(String),
    Message(RawMessage),
    /// Binary event header buffered, payload frame still to come
    Pending,
    /// Peer closed the connection or the namespace
    Closed,
}

#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending_event: Option<String>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, frame: Frame) -> Result<Decoded, FrameError> {
        match frame {
            Frame::Text(text) => self.decode_text(text),
            Frame::Binary(bytes) => {
                let name = self.pending_event.take().ok_or(FrameError::OrphanBinary)?;
                assemble_binary(&name, &bytes).map(Decoded::Message)
            }
            Frame::Close => Ok(Decoded::Closed),
        }
    }

    fn decode_text(&mut self, text: String) -> Result<Decoded, FrameError> {
        match Packet::classify(&text) {
            Packet::Ping => Ok(Decoded::Ping),
            Packet::BinaryEvent(header) => {
                let name = binary_event_name(header)?;
                // A header replaces any header whose payload never arrived
                self.pending_event = Some(name);
                Ok(Decoded::Pending)
            }
            Packet::Disconnect => Ok(Decoded::Closed),
            Packet::Open(_) | Packet::Connect(_) | Packet::Pong => Ok(Decoded::Control(text)),
            Packet::Event(_) | Packet::Other(_) => Ok(Decoded::Message(RawMessage::from(text))),
        }
    }
}
