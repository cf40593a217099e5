//! Game-server identification by payload signature.
//!
//! Until a flow is known, every TCP payload is scanned for one of two
//! signatures: the fragment walk (scatter frames whose bodies carry the
//! service uuid) and the fixed-size login packet. A match promotes the
//! flow to the single active server. The signatures are the only
//! identification mechanism; if the wire format changes the pipeline
//! silently degrades to "no active server".

use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::wire::ByteReader;

/// Five-tuple key for a TCP flow (direction-sensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub src_ip: [u8; 4],
    pub src_port: u16,
    pub dst_ip: [u8; 4],
    pub dst_port: u16,
}

impl std::fmt::Display for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.src_ip;
        let d = self.dst_ip;
        write!(
            f,
            "{}.{}.{}.{}:{} -> {}.{}.{}.{}:{}",
            s[0], s[1], s[2], s[3], self.src_port, d[0], d[1], d[2], d[3], self.dst_port
        )
    }
}

/// What the driver should do with a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    /// Segment belongs to the active server; reassemble it.
    Deliver,
    /// A known-but-inactive flow took over; reset reassembly to this
    /// segment, then deliver it.
    SwitchedActive,
    /// A signature just promoted this flow; reset reassembly past this
    /// segment and do not forward it.
    PromotedNew,
    /// Unknown flow, no signature; drop.
    Ignore,
}

#[derive(Debug, Default)]
pub struct ServerIdentifier {
    known: HashSet<ServerKey>,
    active: Option<ServerKey>,
}

/// Service-uuid bytes as they appear inside a scatter fragment body.
const FRAGMENT_SIG: [u8; 6] = [0x00, 0x63, 0x33, 0x53, 0x42, 0x00];

/// Iteration cap for the fragment walk.
const FRAGMENT_WALK_CAP: usize = 1000;

/// Login packet: total length and the two fixed byte runs.
const LOGIN_LEN: usize = 98;
const LOGIN_PREFIX: [u8; 10] = [0x00, 0x00, 0x00, 0x62, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01];
const LOGIN_MARK: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x0a, 0x4e];

impl ServerIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<ServerKey> {
        self.active
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Classify one segment. Detectors keep running for unknown flows
    /// even while a server is active; a relogin onto a different server
    /// must still be caught.
    pub fn observe(&mut self, key: ServerKey, payload: &[u8]) -> FlowAction {
        if self.active == Some(key) {
            return FlowAction::Deliver;
        }
        if self.known.contains(&key) {
            debug!(flow = %key, "known flow became active");
            self.active = Some(key);
            return FlowAction::SwitchedActive;
        }
        if has_fragment_signature(payload) || has_login_signature(payload) {
            debug!(flow = %key, "game server identified");
            self.known.insert(key);
            self.active = Some(key);
            return FlowAction::PromotedNew;
        }
        FlowAction::Ignore
    }
}

/// Walk size-prefixed fragments looking for the service-uuid run at
/// body offset 5.
fn has_fragment_signature(payload: &[u8]) -> bool {
    if payload.len() < 10 || payload[4] != 0 {
        return false;
    }
    let mut r = ByteReader::new(&payload[10..]);
    for _ in 0..FRAGMENT_WALK_CAP {
        let Ok(frag_len) = r.read_u32_be() else {
            return false;
        };
        let Some(body_len) = (frag_len as usize).checked_sub(4) else {
            return false;
        };
        let Ok(body) = r.read_bytes(body_len) else {
            return false;
        };
        if body.len() >= 11 && body[5..11] == FRAGMENT_SIG {
            return true;
        }
        if r.is_empty() {
            return false;
        }
    }
    warn!("fragment signature walk hit its iteration cap");
    false
}

fn has_login_signature(payload: &[u8]) -> bool {
    payload.len() == LOGIN_LEN
        && payload[..10] == LOGIN_PREFIX
        && payload[14..20] == LOGIN_MARK
}
