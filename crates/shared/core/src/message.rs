//! Raw messages and socket.io framing
//!
//! Everything the dispatcher routes is a [`RawMessage`]: the text of one
//! inbound frame, shared cheaply between the correlator and subscriptions.
//! [`Packet`] classifies engine.io/socket.io frames, [`EventFrame`] decodes
//! `42["name", payload]` events and [`commands`] builds outbound ones.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;

use crate::error::FrameError;

/// Event names pushed or accepted by the platform
pub mod events {
    pub const AUTH: &str = "auth";
    pub const SUCCESS_AUTH: &str = "successauth";
    pub const NOT_AUTHORIZED: &str = "NotAuthorized";
    pub const OPEN_ORDER: &str = "openOrder";
    pub const SUCCESS_OPEN_ORDER: &str = "successopenOrder";
    pub const FAIL_OPEN_ORDER: &str = "failopenOrder";
    pub const SUCCESS_CLOSE_ORDER: &str = "successcloseOrder";
    pub const UPDATE_OPENED_DEALS: &str = "updateOpenedDeals";
    pub const UPDATE_CLOSED_DEALS: &str = "updateClosedDeals";
    pub const SUCCESS_UPDATE_BALANCE: &str = "successupdateBalance";
    pub const UPDATE_STREAM: &str = "updateStream";
    pub const UPDATE_ASSETS: &str = "updateAssets";
    pub const UPDATE_HISTORY_NEW_FAST: &str = "updateHistoryNewFast";
    pub const CHANGE_SYMBOL: &str = "changeSymbol";
    pub const LOAD_HISTORY_PERIOD: &str = "loadHistoryPeriod";
}

/// Text of one inbound message
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawMessage(Arc<str>);

impl RawMessage {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode as a socket.io event, if it is one
    pub fn event(&self) -> Option<EventFrame> {
        EventFrame::parse(&self.0).ok()
    }

    /// Payload of the event carried by this message, or the whole text
    /// parsed as JSON when it is not an event frame.
    pub fn json(&self) -> Option<Value> {
        match self.event() {
            Some(event) => Some(event.payload),
            None => serde_json::from_str(&self.0).ok(),
        }
    }
}

impl Deref for RawMessage {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RawMessage {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawMessage {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&str> for RawMessage {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawMessage({:?})", &*self.0)
    }
}

/// A decoded `42["name", payload]` event
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub name: String,
    pub payload: Value,
}

impl EventFrame {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let body = text.strip_prefix("42").ok_or(FrameError::NotAnEvent)?;
        Self::from_array(body)
    }

    fn from_array(body: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let mut items = match value {
            Value::Array(items) => items.into_iter(),
            _ => return Err(FrameError::NotAnEvent),
        };
        let name = match items.next() {
            Some(Value::String(name)) => name,
            _ => return Err(FrameError::NotAnEvent),
        };
        Ok(Self {
            name,
            payload: items.next().unwrap_or(Value::Null),
        })
    }

    /// Encode as outbound text
    pub fn encode(&self) -> String {
        format!("42{}", Value::Array(vec![Value::from(self.name.as_str()), self.payload.clone()]))
    }

    pub fn into_message(self) -> RawMessage {
        RawMessage::from(self.encode())
    }
}

/// Classification of one engine.io/socket.io text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet<'a> {
    /// `0{..}` engine.io open
    Open(&'a str),
    /// `2` server ping
    Ping,
    /// `3` pong
    Pong,
    /// `40{..}` namespace connected
    Connect(&'a str),
    /// `41` namespace disconnect
    Disconnect,
    /// `42[..]` event
    Event(&'a str),
    /// `451-[..]` header of an event whose payload follows as a binary frame
    BinaryEvent(&'a str),
    Other(&'a str),
}

impl<'a> Packet<'a> {
    pub fn classify(text: &'a str) -> Self {
        if let Some(rest) = text.strip_prefix("451-") {
            Packet::BinaryEvent(rest)
        } else if text.starts_with("42") {
            Packet::Event(text)
        } else if let Some(rest) = text.strip_prefix("40") {
            Packet::Connect(rest)
        } else if text.starts_with("41") {
            Packet::Disconnect
        } else if text == "2" {
            Packet::Ping
        } else if text == "3" {
            Packet::Pong
        } else if let Some(rest) = text.strip_prefix('0') {
            Packet::Open(rest)
        } else {
            Packet::Other(text)
        }
    }
}

/// Event name announced by a `451-` binary header
pub fn binary_event_name(header: &str) -> Result<String, FrameError> {
    EventFrame::from_array(header).map(|event| event.name)
}

/// Rebuild the text event for a binary payload announced by a header
pub fn assemble_binary(name: &str, payload: &[u8]) -> Result<RawMessage, FrameError> {
    let text = std::str::from_utf8(payload).map_err(|_| FrameError::InvalidUtf8)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    Ok(EventFrame::new(name, value).into_message())
}

/// Builders for outbound commands
pub mod commands {
    use rand::Rng;
    use serde_json::json;

    use super::{EventFrame, events};
    use crate::entities::Direction;

    pub fn emit(name: &str, payload: serde_json::Value) -> String {
        EventFrame::new(name, payload).encode()
    }

    pub fn open_order(
        asset: &str,
        amount: f64,
        direction: Direction,
        duration_secs: u32,
        demo: bool,
        request_id: u64,
    ) -> String {
        emit(
            events::OPEN_ORDER,
            json!({
                "asset": asset,
                "amount": amount,
                "action": direction.as_action(),
                "isDemo": i32::from(demo),
                "requestId": request_id,
                "optionType": 100,
                "time": duration_secs,
            }),
        )
    }

    pub fn change_symbol(asset: &str, period: u32) -> String {
        emit(
            events::CHANGE_SYMBOL,
            json!({ "asset": asset, "period": period }),
        )
    }

    pub fn load_history_period(asset: &str, period: u32, time: i64, index: u64, offset: i64) -> String {
        emit(
            events::LOAD_HISTORY_PERIOD,
            json!({
                "asset": asset,
                "period": period,
                "time": time,
                "index": index,
                "offset": offset,
            }),
        )
    }

    /// Request id echoed back by the server for candle history:
    /// `timestamp * 100 + random(0..100)`
    pub fn history_index(timestamp: i64) -> u64 {
        let jitter: u64 = rand::thread_rng().gen_range(0..100);
        (timestamp.max(0) as u64) * 100 + jitter
    }

    /// Random request id for order placement
    pub fn request_id() -> u64 {
        rand::thread_rng().gen_range(1_000_000..100_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Direction;
    use serde_json::json;

    #[test]
    fn test_event_parse() {
        let event = EventFrame::parse(r#"42["successupdateBalance",{"balance":50000.0}]"#).unwrap();
        assert_eq!(event.name, "successupdateBalance");
        assert_eq!(event.payload["balance"], 50000.0);

        let bare = EventFrame::parse(r#"42["ping"]"#).unwrap();
        assert_eq!(bare.payload, Value::Null);

        assert_eq!(EventFrame::parse("3"), Err(FrameError::NotAnEvent));
        assert!(matches!(
            EventFrame::parse("42[\"oops\","),
            Err(FrameError::InvalidJson(_))
        ));
        assert_eq!(EventFrame::parse("42{}"), Err(FrameError::NotAnEvent));
    }

    #[test]
    fn test_classify() {
        assert_eq!(Packet::classify("0{\"sid\":\"x\"}"), Packet::Open("{\"sid\":\"x\"}"));
        assert_eq!(Packet::classify("2"), Packet::Ping);
        assert_eq!(Packet::classify("3"), Packet::Pong);
        assert_eq!(Packet::classify("40{\"sid\":\"y\"}"), Packet::Connect("{\"sid\":\"y\"}"));
        assert_eq!(Packet::classify("41"), Packet::Disconnect);
        assert!(matches!(Packet::classify("42[\"a\",1]"), Packet::Event(_)));
        assert_eq!(
            Packet::classify(r#"451-["updateStream",{"_placeholder":true,"num":0}]"#),
            Packet::BinaryEvent(r#"["updateStream",{"_placeholder":true,"num":0}]"#)
        );
    }

    #[test]
    fn test_binary_reassembly() {
        let name = binary_event_name(r#"["updateStream",{"_placeholder":true,"num":0}]"#).unwrap();
        assert_eq!(name, "updateStream");

        let message = assemble_binary(&name, br#"[["EURUSD_otc",1700000000.5,1.08]]"#).unwrap();
        assert_eq!(message.as_str(), r#"42["updateStream",[["EURUSD_otc",1700000000.5,1.08]]]"#);
        assert_eq!(message.json().unwrap()[0][0], "EURUSD_otc");

        assert_eq!(assemble_binary("x", &[0xff, 0xfe]), Err(FrameError::InvalidUtf8));
        assert!(matches!(
            assemble_binary("x", b"{not json"),
            Err(FrameError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_open_order_command() {
        let text = commands::open_order("EURUSD_otc", 1.0, Direction::Put, 60, true, 42);
        let event = EventFrame::parse(&text).unwrap();
        assert_eq!(event.name, "openOrder");
        assert_eq!(
            event.payload,
            json!({
                "asset": "EURUSD_otc",
                "amount": 1.0,
                "action": "put",
                "isDemo": 1,
                "requestId": 42,
                "optionType": 100,
                "time": 60
            })
        );
    }

    #[test]
    fn test_history_index() {
        let index = commands::history_index(1_700_000_000);
        assert!(index >= 170_000_000_000);
        assert!(index < 170_000_000_100);
    }
}
