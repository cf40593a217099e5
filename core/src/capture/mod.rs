pub mod driver;
pub mod frame;
pub mod identify;
pub mod packet;
pub mod reassembly;

pub use driver::{CaptureDriver, CaptureError, Pipeline};
pub use frame::{DecodedRecord, SERVICE_UUID, decode_stream};
pub use identify::{FlowAction, ServerIdentifier, ServerKey};
pub use packet::{TcpSegment, parse_tcp_segment};
pub use reassembly::TcpReassembler;
