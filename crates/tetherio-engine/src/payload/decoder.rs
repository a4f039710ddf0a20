use bytes::Buf;
use tracing::debug;

use super::{BINARY_MESSAGE_TYPE, BINARY_SEPARATOR, STRING_SEPARATOR};
use crate::errors::Error;
use crate::packet::Packet;

/// Decode an http request body into a list of packets.
///
/// The framing is chosen from the request content-type: octet-stream bodies
/// use the binary framing, everything else the string framing.
pub async fn decoder<B>(body: B, binary: bool, max_payload: u64) -> Result<Vec<Packet>, Error>
where
    B: http_body::Body + Unpin,
    B::Error: std::fmt::Debug,
{
    let data = aggregate(body, max_payload).await?;
    if binary {
        decode_binary_payload(&data)
    } else {
        decode_string_payload(std::str::from_utf8(&data)?)
    }
}

/// Buffer the whole body, bailing out as soon as it exceeds `max_payload`.
async fn aggregate<B>(mut body: B, max_payload: u64) -> Result<Vec<u8>, Error>
where
    B: http_body::Body + Unpin,
    B::Error: std::fmt::Debug,
{
    let mut data: Vec<u8> = Vec::with_capacity(body.size_hint().lower() as usize);
    while let Some(chunk) = body.data().await {
        let mut chunk = chunk.map_err(|e| {
            debug!("error reading request body: {:?}", e);
            Error::HttpBody
        })?;
        if (data.len() + chunk.remaining()) as u64 > max_payload {
            return Err(Error::PayloadTooLarge);
        }
        while chunk.has_remaining() {
            let slice = chunk.chunk();
            data.extend_from_slice(slice);
            let n = slice.len();
            chunk.advance(n);
        }
    }
    Ok(data)
}

/// Decode a `<char count>:<packet>` framed payload.
fn decode_string_payload(mut payload: &str) -> Result<Vec<Packet>, Error> {
    let mut packets = Vec::new();
    while !payload.is_empty() {
        let sep = payload
            .find(STRING_SEPARATOR)
            .ok_or(Error::InvalidPayload)?;
        let len: usize = payload[..sep]
            .parse()
            .map_err(|_| Error::InvalidPacketLength)?;
        payload = &payload[sep + 1..];

        // the length prefix counts characters, not bytes
        let mut indices = payload.char_indices();
        for _ in 0..len {
            indices.next().ok_or(Error::InvalidPacketLength)?;
        }
        let end = indices.next().map(|(i, _)| i).unwrap_or(payload.len());
        packets.push(Packet::try_from(&payload[..end])?);
        payload = &payload[end..];
    }
    Ok(packets)
}

/// Decode a binary framed payload: for each packet a frame-type byte
/// (`0` string, `1` binary), the byte length in decimal digit bytes,
/// a `0xff` separator and then the packet itself.
fn decode_binary_payload(mut payload: &[u8]) -> Result<Vec<Packet>, Error> {
    let mut packets = Vec::new();
    while let Some((frame_type, rest)) = payload.split_first() {
        let binary = match frame_type {
            0 => false,
            1 => true,
            _ => return Err(Error::InvalidPayload),
        };
        payload = rest;

        let mut len: usize = 0;
        loop {
            let (digit, rest) = payload.split_first().ok_or(Error::InvalidPayload)?;
            payload = rest;
            if *digit == BINARY_SEPARATOR {
                break;
            }
            if *digit > 9 {
                return Err(Error::InvalidPacketLength);
            }
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(*digit as usize))
                .ok_or(Error::InvalidPacketLength)?;
        }
        if payload.len() < len {
            return Err(Error::InvalidPacketLength);
        }
        let (packet, rest) = payload.split_at(len);
        payload = rest;

        if binary {
            match packet.split_first() {
                Some((&BINARY_MESSAGE_TYPE, data)) => packets.push(Packet::Binary(data.to_vec())),
                _ => return Err(Error::InvalidPacketType),
            }
        } else {
            packets.push(Packet::try_from(std::str::from_utf8(packet)?)?);
        }
    }
    Ok(packets)
}
