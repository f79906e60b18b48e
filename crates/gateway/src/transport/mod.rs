//! Transport abstraction layer
//!
//! A [`Connector`] opens one socket and splits it into a [`FrameWriter`]
//! (outbound text) and a [`FrameReader`] (inbound frames). The websocket
//! adapter is used against the platform; the channel adapter lets tests
//! script a server in-process.

pub mod channel;
pub mod ws;

use async_trait::async_trait;
use url::Url;

use crate::error::TransportError;

/// One inbound transport frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Outbound half of a connection
#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half of a connection
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next frame; `None` once the peer is gone
    async fn next(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Both halves of a freshly opened connection
pub struct Link {
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
}

/// Opens connections to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Link, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_writer_object_safe(_: &mut dyn FrameWriter) {}
    fn _assert_reader_object_safe(_: &mut dyn FrameReader) {}
    fn _assert_connector_object_safe(_: &dyn Connector) {}
}
