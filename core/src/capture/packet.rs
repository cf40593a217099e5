//! Byte-oriented Ethernet/IPv4/TCP header extraction.
//!
//! Deliberately minimal: the BPF filter already restricts capture to
//! TCP, so this only needs to find the payload and the five-tuple.
//! Anything that does not parse cleanly is dropped.

use super::identify::ServerKey;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;
const IPPROTO_TCP: u8 = 6;

/// A TCP segment with a non-empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub key: ServerKey,
    pub seq: u32,
    pub payload: &'a [u8],
}

/// Parse an Ethernet frame down to its TCP payload.
///
/// Returns `None` for non-IPv4, non-TCP, fragmented-beyond-parsing or
/// empty-payload packets. IPv4 total length trims link-layer padding.
pub fn parse_tcp_segment(frame: &[u8]) -> Option<TcpSegment<'_>> {
    if frame.len() < 14 {
        return None;
    }
    let mut ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let mut offset = 14;
    // At most two VLAN tags (QinQ).
    for _ in 0..2 {
        if ethertype != ETHERTYPE_VLAN && ethertype != ETHERTYPE_QINQ {
            break;
        }
        if frame.len() < offset + 4 {
            return None;
        }
        ethertype = u16::from_be_bytes([frame[offset + 2], frame[offset + 3]]);
        offset += 4;
    }
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }
    parse_ipv4_tcp(&frame[offset..])
}

fn parse_ipv4_tcp(packet: &[u8]) -> Option<TcpSegment<'_>> {
    if packet.len() < 20 || packet[0] >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(packet[0] & 0x0f) * 4;
    if ihl < 20 || packet.len() < ihl {
        return None;
    }
    let total_len = usize::from(u16::from_be_bytes([packet[2], packet[3]]));
    if total_len < ihl || packet.len() < total_len {
        return None;
    }
    if packet[9] != IPPROTO_TCP {
        return None;
    }
    let src_ip: [u8; 4] = packet[12..16].try_into().ok()?;
    let dst_ip: [u8; 4] = packet[16..20].try_into().ok()?;

    // Trim to the IP datagram; Ethernet pads short frames.
    let tcp = &packet[ihl..total_len];
    if tcp.len() < 20 {
        return None;
    }
    let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
    let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
    let seq = u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]);
    let data_offset = usize::from(tcp[12] >> 4) * 4;
    if data_offset < 20 || tcp.len() < data_offset {
        return None;
    }
    let payload = &tcp[data_offset..];
    if payload.is_empty() {
        return None;
    }
    Some(TcpSegment {
        key: ServerKey {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        },
        seq,
        payload,
    })
}
