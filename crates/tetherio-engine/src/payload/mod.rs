//! Payload encoding & decoding for the polling transport.
//!
//! A payload concatenates multiple packets in a single http body. The string
//! framing is `<char count>:<packet>` repeated; the binary framing prefixes
//! each packet with a frame-type byte, the length as decimal digit bytes and
//! a `0xff` separator.

mod decoder;
mod encoder;
mod pauser;

use bytes::Bytes;

pub use decoder::decoder;
pub use encoder::encode_payload;
pub(crate) use encoder::encoder;
pub use pauser::{PauseStatus, Pauser, WorkerGuard};

/// Separator between the length prefix and the packet in the string framing.
pub(crate) const STRING_SEPARATOR: char = ':';
/// Separator between the length digits and the packet in the binary framing.
pub(crate) const BINARY_SEPARATOR: u8 = 0xff;
/// Frame-type byte prepended to binary message payloads, the raw
/// counterpart of the `4` message packet type.
pub const BINARY_MESSAGE_TYPE: u8 = 0x04;

/// An encoded payload ready to be written to a polling request or
/// response body.
#[derive(Debug)]
pub struct Payload {
    pub data: Bytes,
    /// Whether the binary framing was used, which drives the response
    /// content-type.
    pub has_binary: bool,
}
