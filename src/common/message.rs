//! Wire messages
//!
//! Every datagram is one JSON object with a `command` discriminator:
//!
//! ```text
//! {"command": "register", "peer_port": 9000}
//! {"command": "set_next_peer", "next_peer": ["127.0.0.1", 9001]}
//! ```

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Peer identity assigned by the coordinator
pub type PeerId = u64;

/// Opaque item payload. Ordered so its serialization is deterministic.
pub type Payload = BTreeMap<String, String>;

/// Address of a peer as carried on the wire: `[address, port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddr(pub String, pub u16);

impl PeerAddr {
    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .0
            .parse()
            .map_err(|_| Error::Malformed(format!("invalid peer address: {}", self.0)))?;
        Ok(SocketAddr::new(ip, self.1))
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        PeerAddr(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Message {
    /// Node → coordinator: request an identity
    Register { peer_port: u16 },
    /// Coordinator → node: identity assignment
    SetId { peer_id: PeerId },
    /// Coordinator → node: place one item on its owner
    Store { event_id: String, event_data: Payload },
    /// Node → coordinator: item stored
    StoreAck { peer_id: PeerId, event_id: String },
    /// Node → node: lookup, forwarded verbatim around the ring
    FindEvent {
        event_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<PeerAddr>,
    },
    /// Owner → originator: lookup answer
    FoundEvent { event_id: String, event_data: Payload },
    /// Node → coordinator: voluntary departure
    Leave { peer_id: PeerId },
    /// Coordinator → node: successor update
    SetNextPeer { next_peer: PeerAddr },
    /// Coordinator → node: advisory shutdown
    Teardown,
}

const COMMANDS: &[&str] = &[
    "register",
    "set_id",
    "store",
    "store_ack",
    "find_event",
    "found_event",
    "leave",
    "set_next_peer",
    "teardown",
];

impl Message {
    /// The `command` discriminator
    pub fn command(&self) -> &'static str {
        match self {
            Message::Register { .. } => "register",
            Message::SetId { .. } => "set_id",
            Message::Store { .. } => "store",
            Message::StoreAck { .. } => "store_ack",
            Message::FindEvent { .. } => "find_event",
            Message::FoundEvent { .. } => "found_event",
            Message::Leave { .. } => "leave",
            Message::SetNextPeer { .. } => "set_next_peer",
            Message::Teardown => "teardown",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode one datagram.
    ///
    /// Unparseable input and known commands with bad fields are
    /// `Error::Malformed`; a well-formed object naming a command we don't
    /// speak is `Error::UnknownCommand`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let command = match value.get("command") {
            Some(serde_json::Value::String(c)) => c.clone(),
            Some(other) => {
                return Err(Error::Malformed(format!(
                    "command must be a string, got {}",
                    other
                )))
            }
            None => return Err(Error::Malformed("missing command field".into())),
        };
        if !COMMANDS.contains(&command.as_str()) {
            return Err(Error::UnknownCommand(command));
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, &str)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_command_tag_on_wire() {
        let bytes = Message::Register { peer_port: 9000 }.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["command"], "register");
        assert_eq!(value["peer_port"], 9000);

        let bytes = Message::Teardown.encode().unwrap();
        assert_eq!(bytes, br#"{"command":"teardown"}"#);
    }

    #[test]
    fn test_next_peer_is_pair() {
        let msg = Message::SetNextPeer {
            next_peer: PeerAddr("127.0.0.1".into(), 9001),
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["next_peer"], serde_json::json!(["127.0.0.1", 9001]));
    }

    #[test]
    fn test_decode_from_foreign_json() {
        let msg = Message::decode(
            br#"{"command":"store","event_id":"EVT1","event_data":{"STATE":"TEXAS"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            Message::Store {
                event_id: "EVT1".into(),
                event_data: payload(&[("STATE", "TEXAS")]),
            }
        );
    }

    #[test]
    fn test_find_event_origin_optional() {
        let msg = Message::decode(br#"{"command":"find_event","event_id":"E"}"#).unwrap();
        assert_eq!(
            msg,
            Message::FindEvent {
                event_id: "E".into(),
                origin: None
            }
        );

        let without = Message::FindEvent {
            event_id: "E".into(),
            origin: None,
        };
        let value: serde_json::Value =
            serde_json::from_slice(&without.encode().unwrap()).unwrap();
        assert!(value.get("origin").is_none());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Message::decode(b"not json"),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            Message::decode(br#"{"peer_port":1}"#),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            Message::decode(br#"{"command":42}"#),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            Message::decode(br#"{"command":"register"}"#),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            Message::decode(br#"{"command":"ping"}"#),
            Err(Error::UnknownCommand(c)) if c == "ping"
        ));
    }

    #[test]
    fn test_peer_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let peer = PeerAddr::from(addr);
        assert_eq!(peer.to_string(), "127.0.0.1:9000");
        assert_eq!(peer.to_socket_addr().unwrap(), addr);

        let v6: SocketAddr = "[::1]:9000".parse().unwrap();
        assert_eq!(PeerAddr::from(v6).to_socket_addr().unwrap(), v6);

        assert!(PeerAddr("localhost".into(), 1).to_socket_addr().is_err());
    }

    #[test]
    fn test_command_names_known() {
        let all = [
            Message::Register { peer_port: 1 },
            Message::SetId { peer_id: 0 },
            Message::Store {
                event_id: "e".into(),
                event_data: Payload::new(),
            },
            Message::StoreAck {
                peer_id: 0,
                event_id: "e".into(),
            },
            Message::FindEvent {
                event_id: "e".into(),
                origin: None,
            },
            Message::FoundEvent {
                event_id: "e".into(),
                event_data: Payload::new(),
            },
            Message::Leave { peer_id: 0 },
            Message::SetNextPeer {
                next_peer: PeerAddr("127.0.0.1".into(), 1),
            },
            Message::Teardown,
        ];
        for msg in all {
            assert!(COMMANDS.contains(&msg.command()));
            let decoded = Message::decode(&msg.encode().unwrap()).unwrap();
            assert_eq!(decoded.command(), msg.command());
        }
    }
}
