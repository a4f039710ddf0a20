use bytes::{BufMut, BytesMut};
use tokio::sync::mpsc::Receiver;

use super::{Pauser, Payload, BINARY_MESSAGE_TYPE, BINARY_SEPARATOR, STRING_SEPARATOR};
use crate::errors::Error;
use crate::packet::Packet;

/// Drain the session buffer into a [`Payload`] for a polling response.
///
/// If the buffer is empty the call parks until a packet is queued, the
/// session is closed (`Error::Aborted`) or a transport upgrade pauses the
/// buffer, in which case a single [`Packet::Noop`] is flushed to release
/// the client.
pub async fn encoder(
    rx: &mut Receiver<Packet>,
    pauser: &Pauser,
    supports_binary: bool,
    max_payload: u64,
) -> Result<Payload, Error> {
    let mut packets = Vec::new();
    let mut size = 0u64;

    while size < max_payload {
        match rx.try_recv() {
            Ok(packet) => {
                size += packet_size_hint(&packet) as u64;
                let close = packet == Packet::Close;
                packets.push(packet);
                if close {
                    rx.close();
                    break;
                }
            }
            Err(_) => break,
        }
    }

    if packets.is_empty() {
        tokio::select! {
            packet = rx.recv() => match packet {
                Some(packet) => {
                    if packet == Packet::Close {
                        rx.close();
                    }
                    packets.push(packet);
                }
                None => return Err(Error::Aborted),
            },
            _ = pauser.pausing() => packets.push(Packet::Noop),
        }
    }

    encode_payload(packets, supports_binary)
}

/// Encode a list of packets using the binary framing if the client supports
/// it and at least one packet is binary, the string framing otherwise.
pub fn encode_payload(packets: Vec<Packet>, supports_binary: bool) -> Result<Payload, Error> {
    let has_binary = supports_binary && packets.iter().any(Packet::is_binary);
    let mut data = BytesMut::new();
    for packet in packets {
        if has_binary {
            encode_binary_frame(packet, &mut data)?;
        } else {
            encode_string_frame(packet, &mut data)?;
        }
    }
    Ok(Payload {
        data: data.freeze(),
        has_binary,
    })
}

/// `<char count>:<packet>`, where binary packets fall back to `b4<base64>`.
pub(crate) fn encode_string_frame(packet: Packet, data: &mut BytesMut) -> Result<(), Error> {
    let packet: String = packet.try_into()?;
    data.extend_from_slice(packet.chars().count().to_string().as_bytes());
    data.put_u8(STRING_SEPARATOR as u8);
    data.extend_from_slice(packet.as_bytes());
    Ok(())
}

/// Frame-type byte, byte length as decimal digit bytes, `0xff`, packet.
fn encode_binary_frame(packet: Packet, data: &mut BytesMut) -> Result<(), Error> {
    match packet {
        Packet::Binary(bin) => {
            data.put_u8(1);
            put_digit_bytes(bin.len() + 1, data);
            data.put_u8(BINARY_SEPARATOR);
            data.put_u8(BINARY_MESSAGE_TYPE);
            data.extend_from_slice(&bin);
        }
        packet => {
            let packet: String = packet.try_into()?;
            data.put_u8(0);
            put_digit_bytes(packet.len(), data);
            data.put_u8(BINARY_SEPARATOR);
            data.extend_from_slice(packet.as_bytes());
        }
    }
    Ok(())
}

/// Write `n` as its decimal digits, one byte per digit.
fn put_digit_bytes(n: usize, data: &mut BytesMut) {
    for digit in n.to_string().bytes() {
        data.put_u8(digit - b'0');
    }
}

/// Rough wire size of a packet, used to cap the flushed payload.
fn packet_size_hint(packet: &Packet) -> usize {
    match packet {
        Packet::Message(msg) => msg.len() + 1,
        Packet::Binary(data) => data.len() + 2,
        Packet::Ping(data) | Packet::Pong(data) => data.len() + 1,
        _ => 1,
    }
}
