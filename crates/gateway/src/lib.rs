//! Pocket Gateway
//!
//! Everything between the socket and the client API:
//! - Transport abstraction (websocket, plus in-process channels for tests)
//! - Connection manager with bounded reconnect and the socket.io handshake
//! - Dispatcher fanning inbound messages out to observers, pending requests
//!   and subscriptions
//!
//! ## Architecture
//!
//! ```text
//!  Platform (socket.io over wss)
//!         │
//!    ┌────▼──────┐   reconnect / handshake
//!    │ Transport │◄──────────── ConnectionManager
//!    └────┬──────┘
//!         │ frames
//!    ┌────▼───────┐
//!    │ Dispatcher │──► FrameObservers (ledger, session state)
//!    └────┬───────┘
//!         ├──► Correlator     send_and_wait
//!         └──► Subscriptions  plain / chunked / timed streams
//! ```

pub mod codec;
pub mod connection;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod subscription;
pub mod transport;

// Re-export commonly used types
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatcher::FrameObserver;
pub use error::{GatewayError, Result, TransportError};
pub use session::{Session, SessionBuilder};
pub use subscription::{StreamItem, Subscription, SubscriptionMode};
pub use transport::{
    Connector, Frame, FrameReader, FrameWriter, Link,
    channel::{ChannelConnector, ChannelServer, ServerConnection},
    ws::WsConnector,
};
