//! Wire protocol codec and data types shared between the session layer,
//! the log pipeline, and the integration tests.
//!
//! The control protocol is a fixed byte format: every datagram starts with a
//! four `0xFF` marker, outbound bodies are NUL terminated, and oversized
//! replies arrive split across several datagrams carrying an index/count
//! byte. Everything in this crate is stateless; reassembly state lives in
//! the session.

use std::collections::HashMap;

/// Marker prefixed to every datagram in both directions.
pub const PACKET_MARKER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// First byte of a fragmented (multi-packet) response.
pub const SPLIT_MARKER: u8 = 0xFE;

/// Bytes stripped from the front of a completed response payload.
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Offset of the packed count/index byte in a fragment datagram.
pub const FRAGMENT_META_OFFSET: usize = 8;

/// Offset at which a fragment's payload begins.
pub const FRAGMENT_PAYLOAD_OFFSET: usize = 9;

/// Body of the handshake request that asks the server for a challenge id.
pub const CHALLENGE_REQUEST: &str = "challenge rcon";

const CHALLENGE_REPLY_PREFIX: &[u8] = b"\xFF\xFF\xFF\xFFchallenge rcon ";
const BAD_PASSWORD_PREFIX: &[u8] = b"\xFF\xFF\xFF\xFFlBad rcon_password.";
const BAD_CHALLENGE_PREFIX: &[u8] = b"\xFF\xFF\xFF\xFFlBad challenge.";

/// Frames an outbound request: marker, body, NUL terminator.
pub fn frame_request(body: &str) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(PACKET_MARKER.len() + body.len() + 1);
    datagram.extend_from_slice(&PACKET_MARKER);
    datagram.extend_from_slice(body.as_bytes());
    datagram.push(0);
    datagram
}

/// Builds the body of an authenticated command.
///
/// The challenge id must be echoed with every command; the server rejects
/// commands carrying a stale or missing id.
pub fn command_body(challenge_id: &str, password: &str, args: &str) -> String {
    format!("rcon {} \"{}\" {}", challenge_id, password, args)
}

/// A decoded inbound control-channel datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Challenge handshake reply carrying the id to echo with commands.
    Challenge { challenge_id: String },
    /// The server rejected our rcon password. Fatal to the session.
    BadPassword,
    /// The server rejected our challenge id. Fatal to the session.
    BadChallenge,
    /// A complete single-datagram command response.
    Single { payload: Vec<u8> },
    /// One piece of a multi-datagram response. `total` is the same for every
    /// fragment of a response; `index` orders them.
    Fragment {
        index: usize,
        total: usize,
        payload: Vec<u8>,
    },
    /// Anything that fits none of the above. Dropped by the caller.
    Malformed,
}

/// Classifies a raw inbound datagram.
pub fn decode_datagram(data: &[u8]) -> Inbound {
    if data.starts_with(CHALLENGE_REPLY_PREFIX) {
        let rest = &data[CHALLENGE_REPLY_PREFIX.len()..];
        let token = String::from_utf8_lossy(rest);
        let challenge_id = token
            .trim_matches(|c| c == ' ' || c == '\n' || c == '\0')
            .to_string();
        if challenge_id.is_empty() {
            return Inbound::Malformed;
        }
        return Inbound::Challenge { challenge_id };
    }

    if data.starts_with(BAD_PASSWORD_PREFIX) {
        return Inbound::BadPassword;
    }

    if data.starts_with(BAD_CHALLENGE_PREFIX) {
        return Inbound::BadChallenge;
    }

    if data.first() == Some(&SPLIT_MARKER) {
        if data.len() <= FRAGMENT_PAYLOAD_OFFSET {
            return Inbound::Malformed;
        }
        let meta = data[FRAGMENT_META_OFFSET];
        let total = (meta & 0x0F) as usize;
        let index = (meta >> 4) as usize;
        if total == 0 {
            return Inbound::Malformed;
        }
        return Inbound::Fragment {
            index,
            total,
            payload: data[FRAGMENT_PAYLOAD_OFFSET..].to_vec(),
        };
    }

    if data.len() >= 4 && data[1..4] == [0xFF, 0xFF, 0xFF] {
        return Inbound::Single {
            payload: data.to_vec(),
        };
    }

    Inbound::Malformed
}

/// Strips a completed response payload down to its text.
///
/// Drops the 5-byte header (marker plus response type byte) and trims the
/// trailing NUL/whitespace the server appends. Applied to single-packet
/// payloads and to the index-order concatenation of a fragment set.
pub fn strip_response(raw: &[u8]) -> String {
    let body: &[u8] = if raw.len() > RESPONSE_HEADER_LEN {
        &raw[RESPONSE_HEADER_LEN..]
    } else {
        &[]
    };
    String::from_utf8_lossy(body)
        .trim_matches(|c| c == ' ' || c == '\n' || c == '\0')
        .to_string()
}

/// A classified log-stream event: a rule name plus the named captures that
/// matched. Immutable and short-lived; consumers clone what they keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub fields: HashMap<String, String>,
}

impl Event {
    pub fn new(name: &str, fields: HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            fields,
        }
    }

    /// Convenience lookup for a single field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// A connected player, keyed by the stable `unique_id` (e.g.
/// `STEAM_0:1:12345`). The per-connection `user_id` changes across
/// reconnects; the unique id does not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Player {
    pub unique_id: String,
    pub user_id: String,
    pub name: String,
    pub team: String,
    pub ip: String,
    /// Everything else the server reports (model, ping, loss, ...).
    pub attributes: HashMap<String, String>,
}

impl Player {
    pub fn new(unique_id: &str) -> Self {
        Self {
            unique_id: unique_id.to_string(),
            ..Self::default()
        }
    }

    /// Merges a field map into this record. Known keys update the typed
    /// fields, everything else lands in `attributes`. Later values always
    /// overwrite earlier ones.
    pub fn merge(&mut self, fields: &HashMap<String, String>) {
        for (key, value) in fields {
            match key.as_str() {
                "uniqueid" => self.unique_id = value.clone(),
                "userid" => self.user_id = value.clone(),
                "name" => self.name = value.clone(),
                "team" => self.team = value.clone(),
                "ip" => self.ip = value.clone(),
                _ => {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Looks up any field, typed or extra, by its wire name.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "uniqueid" => Some(&self.unique_id),
            "userid" => Some(&self.user_id),
            "name" => Some(&self.name),
            "team" => Some(&self.team),
            "ip" => Some(&self.ip),
            _ => self.attributes.get(key).map(String::as_str),
        }
    }

    /// Real players have a platform id; bots and the listen-server host do
    /// not.
    pub fn is_player(&self) -> bool {
        self.unique_id.starts_with("STEAM_")
    }
}
