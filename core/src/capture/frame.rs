//! Application-layer frame extraction.
//!
//! The reassembled stream is a sequence of length-prefixed frames:
//! `[u32 size BE][u16 type BE][body]`, where `size` includes its own
//! four bytes and bit 15 of `type` marks a zstd-compressed body. Only
//! two envelopes matter: `Notify` carries one method payload for a
//! fixed service uuid, `FrameDown` recursively wraps another frame
//! stream. Anything that fails inside a single frame drops that frame,
//! never the stream loop.

use tracing::{debug, trace, warn};

use crate::protocol::Opcode;
use crate::wire::ByteReader;

/// Fixed identifier of the game's application service ("c3SB").
pub const SERVICE_UUID: u64 = 0x0000_0000_6333_5342;

const ENVELOPE_NOTIFY: u16 = 1;
const ENVELOPE_FRAME_DOWN: u16 = 6;

/// Smallest legal frame: the size field plus the type field.
const MIN_FRAME_SIZE: u32 = 6;

/// Hard cap on frames drained per call.
const FRAME_LOOP_CAP: usize = 1000;

/// `FrameDown` nesting bound against adversarial wrapping.
const MAX_NESTING_DEPTH: u32 = 8;

/// One decoded `(opcode, payload)` record headed for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl DecodedRecord {
    /// Synthetic record announcing an active-server change.
    pub fn server_change() -> Self {
        Self {
            opcode: Opcode::ServerChange,
            payload: Vec::new(),
        }
    }
}

/// Drain every complete frame from the front of `stream`, appending
/// decoded records to `out`. Incomplete trailing bytes stay in the
/// buffer for the next call.
pub fn decode_stream(stream: &mut Vec<u8>, out: &mut Vec<DecodedRecord>) {
    for _ in 0..FRAME_LOOP_CAP {
        if stream.len() < 4 {
            return;
        }
        let reader = ByteReader::new(stream);
        let Ok(packet_size) = reader.peek_u32_be() else {
            return;
        };
        if packet_size < MIN_FRAME_SIZE || (stream.len() as u64) < u64::from(packet_size) {
            return;
        }
        let frame: Vec<u8> = stream.drain(..packet_size as usize).collect();
        decode_frame(&frame, 0, out);
    }
    warn!("frame extraction hit its loop cap; leaving the rest buffered");
}

/// Decode one complete frame. Errors are local to the frame.
fn decode_frame(frame: &[u8], depth: u32, out: &mut Vec<DecodedRecord>) {
    let mut r = ByteReader::new(frame);
    let result = (|| -> crate::wire::WireResult<()> {
        r.skip(4)?; // size, already validated
        let packet_type = r.read_u16_be()?;
        let is_zstd = packet_type & 0x8000 != 0;
        let msg_type = packet_type & 0x7fff;
        match msg_type {
            ENVELOPE_NOTIFY => decode_notify(&mut r, is_zstd, out),
            ENVELOPE_FRAME_DOWN => decode_frame_down(&mut r, is_zstd, depth, out),
            other => {
                trace!(envelope = other, "dropping unhandled envelope");
                Ok(())
            }
        }
    })();
    if let Err(err) = result {
        debug!(%err, "dropping malformed frame");
    }
}

fn decode_notify(
    r: &mut ByteReader<'_>,
    is_zstd: bool,
    out: &mut Vec<DecodedRecord>,
) -> crate::wire::WireResult<()> {
    let service_uuid = r.read_u64_be()?;
    if service_uuid != SERVICE_UUID {
        debug!(service_uuid, "dropping notify for foreign service");
        return Ok(());
    }
    r.skip(4)?; // stub id
    let method_id = r.read_u32_be()?;
    let body = r.read_remaining();
    let payload = if is_zstd {
        match zstd::stream::decode_all(body) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(%err, method_id, "zstd decompression failed; dropping frame");
                return Ok(());
            }
        }
    } else {
        body.to_vec()
    };
    match Opcode::from_method_id(method_id) {
        Some(opcode) => out.push(DecodedRecord { opcode, payload }),
        None => trace!(method_id, "unknown method id"),
    }
    Ok(())
}

fn decode_frame_down(
    r: &mut ByteReader<'_>,
    is_zstd: bool,
    depth: u32,
    out: &mut Vec<DecodedRecord>,
) -> crate::wire::WireResult<()> {
    if depth >= MAX_NESTING_DEPTH {
        warn!(depth, "frame nesting exceeds bound; dropping");
        return Ok(());
    }
    r.skip(4)?; // sequence id
    let body = r.read_remaining();
    let nested = if is_zstd {
        match zstd::stream::decode_all(body) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(%err, "zstd decompression of nested frame failed");
                return Ok(());
            }
        }
    } else {
        body.to_vec()
    };
    // The nested bytes form their own frame stream; incomplete leftovers
    // inside a FrameDown are unrecoverable and dropped with it.
    let mut nested_stream = nested;
    for _ in 0..FRAME_LOOP_CAP {
        if nested_stream.len() < 4 {
            return Ok(());
        }
        let Ok(size) = ByteReader::new(&nested_stream).peek_u32_be() else {
            return Ok(());
        };
        if size < MIN_FRAME_SIZE || (nested_stream.len() as u64) < u64::from(size) {
            return Ok(());
        }
        let frame: Vec<u8> = nested_stream.drain(..size as usize).collect();
        decode_frame(&frame, depth + 1, out);
    }
    warn!("nested frame loop hit its cap");
    Ok(())
}
