//! Session identifier
//!
//! Accepts either the full socket.io auth frame copied from a browser session
//! (`42["auth",{"session":"..","isDemo":1,"uid":..,"platform":..}]`) or a
//! bare session token.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use crate::error::SsidError;

const AUTH_PREFIX: &str = "42[\"auth\",";
const DEFAULT_PLATFORM: i64 = 2;

#[derive(Clone, PartialEq, Eq)]
pub struct Ssid {
    session: String,
    demo: bool,
    uid: i64,
    platform: i64,
    /// Auth frame exactly as supplied, when one was supplied
    raw: Option<String>,
}

impl Ssid {
    pub fn parse(input: &str) -> Result<Self, SsidError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SsidError::Empty);
        }
        if !input.starts_with(AUTH_PREFIX) {
            return Ok(Self {
                session: input.to_string(),
                demo: false,
                uid: 0,
                platform: DEFAULT_PLATFORM,
                raw: None,
            });
        }

        let array: Value = serde_json::from_str(&input[2..])
            .map_err(|e| SsidError::Malformed(e.to_string()))?;
        let body = array
            .get(1)
            .and_then(Value::as_object)
            .ok_or_else(|| SsidError::Malformed("missing auth object".to_string()))?;
        let session = body
            .get("session")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SsidError::Malformed("missing session".to_string()))?;

        Ok(Self {
            session: session.to_string(),
            demo: body.get("isDemo").and_then(Value::as_i64) == Some(1),
            uid: body.get("uid").and_then(Value::as_i64).unwrap_or(0),
            platform: body
                .get("platform")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_PLATFORM),
            raw: Some(input.to_string()),
        })
    }

    pub fn is_demo(&self) -> bool {
        self.demo
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// Frame sent after the namespace connect during the handshake
    pub fn auth_frame(&self) -> String {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => format!(
                "42{}",
                json!([
                    "auth",
                    {
                        "session": self.session,
                        "isDemo": i32::from(self.demo),
                        "uid": self.uid,
                        "platform": self.platform,
                    }
                ])
            ),
        }
    }
}

impl FromStr for Ssid {
    type Err = SsidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ssid::parse(s)
    }
}

// Never print the session token
impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ssid")
            .field("demo", &self.demo)
            .field("uid", &self.uid)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str =
        r#"42["auth",{"session":"abc123","isDemo":1,"uid":87654321,"platform":2}]"#;

    #[test]
    fn test_parse_auth_frame() {
        let ssid = Ssid::parse(DEMO).unwrap();
        assert!(ssid.is_demo());
        assert_eq!(ssid.session(), "abc123");
        assert_eq!(ssid.uid(), 87654321);
        assert_eq!(ssid.auth_frame(), DEMO);
    }

    #[test]
    fn test_parse_bare_token() {
        let ssid: Ssid = "  token-xyz ".parse().unwrap();
        assert!(!ssid.is_demo());
        assert_eq!(ssid.session(), "token-xyz");

        let frame = ssid.auth_frame();
        assert!(frame.starts_with(AUTH_PREFIX));
        let value: Value = serde_json::from_str(&frame[2..]).unwrap();
        assert_eq!(value[1]["session"], "token-xyz");
        assert_eq!(value[1]["isDemo"], 0);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Ssid::parse("   "), Err(SsidError::Empty));
        assert!(matches!(
            Ssid::parse(r#"42["auth",{"isDemo":1}]"#),
            Err(SsidError::Malformed(_))
        ));
        assert!(matches!(
            Ssid::parse(r#"42["auth",{"session":"#),
            Err(SsidError::Malformed(_))
        ));
    }

    #[test]
    fn test_debug_hides_session() {
        let ssid = Ssid::parse(DEMO).unwrap();
        assert!(!format!("{:?}", ssid).contains("abc123"));
    }
}
