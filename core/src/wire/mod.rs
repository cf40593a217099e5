pub mod pb;
pub mod reader;

pub use pb::{PbReader, WireType, encode_tag, encode_varint};
pub use reader::{ByteReader, WireError, WireResult};
