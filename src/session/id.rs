//! Session identifier type.

use std::borrow::Borrow;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::ReplError;

/// Identifier of a REPL session.
///
/// Ids are caller-chosen strings (`web`, `invoke`) or derived from the
/// transport: `host:port` for the listener itself, and
/// `host:port#peer-host:peer-port` for each accepted connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for a listening address, `host:port`.
    pub fn for_listener(host: &str, port: u16) -> Self {
        Self(format!("{}:{}", host, port))
    }

    /// Id for one connection accepted by a listener.
    pub fn for_peer(listen: &SocketAddr, peer: &SocketAddr) -> Self {
        Self(format!("{}#{}", listen, peer))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ReplError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ReplError::UnknownSession(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_listener_format() {
        assert_eq!(SessionId::for_listener("127.0.0.1", 30303).as_str(), "127.0.0.1:30303");
    }

    #[test]
    fn test_peer_format() {
        let listen: SocketAddr = "127.0.0.1:30303".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:50123".parse().unwrap();
        assert_eq!(
            SessionId::for_peer(&listen, &peer).to_string(),
            "127.0.0.1:30303#127.0.0.1:50123"
        );
    }

    #[test]
    fn test_parse() {
        let id: SessionId = " web ".parse().unwrap();
        assert_eq!(id.as_str(), "web");
        assert!("".parse::<SessionId>().is_err());
        assert!("   ".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(SessionId::new("foo"), 1);
        assert_eq!(map.get("foo"), Some(&1));
    }
}
