//! Promiscuous capture across all eligible interfaces.
//!
//! One OS thread per device, all feeding a single shared [`Pipeline`]
//! (identification → reassembly → frame extraction) under a mutex.
//! Decoded records leave through an unbounded channel to the engine
//! task; capture threads never block on the consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::frame::{DecodedRecord, decode_stream};
use super::identify::{FlowAction, ServerIdentifier, ServerKey};
use super::packet::parse_tcp_segment;
use super::reassembly::TcpReassembler;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// No interface could be opened at all. Raw capture usually needs
    /// root/administrator or an equivalent capability grant.
    #[error("no usable capture device")]
    NoUsableDevice,
    #[error("listing capture devices failed: {0}")]
    DeviceList(#[source] pcap::Error),
}

/// Identification, reassembly, and frame extraction for the single
/// active flow. Owned by the capture driver; touched only on capture
/// threads (behind one mutex).
#[derive(Debug, Default)]
pub struct Pipeline {
    identifier: ServerIdentifier,
    reassembler: TcpReassembler,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one TCP segment. Decoded records are appended to `out` in
    /// on-wire order; a server change always precedes records decoded
    /// after the switch.
    pub fn feed_segment(&mut self, key: ServerKey, seq: u32, payload: &[u8], out: &mut Vec<DecodedRecord>) {
        match self.identifier.observe(key, payload) {
            FlowAction::Ignore => {}
            FlowAction::PromotedNew => {
                // The signature packet itself is not application data.
                self.reassembler.clear(seq.wrapping_add(payload.len() as u32));
                out.push(DecodedRecord::server_change());
            }
            FlowAction::SwitchedActive => {
                self.reassembler.clear(seq);
                out.push(DecodedRecord::server_change());
                self.reassembler.append_segment(seq, payload);
                decode_stream(self.reassembler.stream_mut(), out);
            }
            FlowAction::Deliver => {
                self.reassembler.append_segment(seq, payload);
                decode_stream(self.reassembler.stream_mut(), out);
            }
        }
    }

    pub fn reassembler(&self) -> &TcpReassembler {
        &self.reassembler
    }
}

/// Running capture threads; join them after signalling shutdown.
pub struct CaptureDriver {
    handles: Vec<JoinHandle<()>>,
    pub device_count: usize,
}

impl CaptureDriver {
    /// Open every eligible device and start capturing.
    ///
    /// A device that fails to open is logged and skipped; only zero
    /// usable devices is fatal.
    pub fn start(
        record_tx: mpsc::UnboundedSender<DecodedRecord>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, CaptureError> {
        let devices = pcap::Device::list().map_err(CaptureError::DeviceList)?;
        let pipeline = Arc::new(Mutex::new(Pipeline::new()));
        let mut handles = Vec::new();

        for device in devices {
            if !device_is_eligible(&device) {
                debug!(name = %device.name, "skipping device");
                continue;
            }
            let name = device.name.clone();
            let capture = pcap::Capture::from_device(device)
                .and_then(|c| c.promisc(true).immediate_mode(true).timeout(400).open())
                .and_then(|mut c| c.filter("tcp", true).map(|()| c));
            let mut capture = match capture {
                Ok(c) => c,
                Err(err) => {
                    warn!(device = %name, %err, "cannot open device; skipping");
                    continue;
                }
            };

            let pipeline = Arc::clone(&pipeline);
            let record_tx = record_tx.clone();
            let shutdown = Arc::clone(&shutdown);
            let spawned = std::thread::Builder::new()
                .name(format!("capture-{name}"))
                .spawn(move || {
                    info!(device = %name, "capture started");
                    let mut scratch = Vec::new();
                    loop {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        match capture.next_packet() {
                            Ok(packet) => {
                                let Some(segment) = parse_tcp_segment(packet.data) else {
                                    continue;
                                };
                                scratch.clear();
                                // A poisoned lock means a sibling capture
                                // thread panicked; keep this one running.
                                pipeline
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .feed_segment(
                                        segment.key,
                                        segment.seq,
                                        segment.payload,
                                        &mut scratch,
                                    );
                                for record in scratch.drain(..) {
                                    if record_tx.send(record).is_err() {
                                        return; // engine gone
                                    }
                                }
                            }
                            Err(pcap::Error::TimeoutExpired) => continue,
                            Err(err) => {
                                warn!(device = %name, %err, "capture loop ended");
                                break;
                            }
                        }
                    }
                    info!(device = %name, "capture stopped");
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(%err, "cannot spawn capture thread; skipping device"),
            }
        }

        if handles.is_empty() {
            return Err(CaptureError::NoUsableDevice);
        }
        let device_count = handles.len();
        Ok(Self {
            handles,
            device_count,
        })
    }

    /// Wait for every capture thread to exit. Call after flipping the
    /// shutdown flag.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Capture device inventory for front-ends: name, description, and
/// whether the driver would open it.
pub fn list_devices() -> Result<Vec<(String, Option<String>, bool)>, CaptureError> {
    let devices = pcap::Device::list().map_err(CaptureError::DeviceList)?;
    Ok(devices
        .iter()
        .map(|d| (d.name.clone(), d.desc.clone(), device_is_eligible(d)))
        .collect())
}

fn device_is_eligible(device: &pcap::Device) -> bool {
    if device.flags.is_loopback() {
        return false;
    }
    let name = device.name.to_lowercase();
    let desc = device
        .desc
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    for needle in ["loopback", "bluetooth"] {
        if name.contains(needle) || desc.contains(needle) {
            return false;
        }
    }
    true
}
