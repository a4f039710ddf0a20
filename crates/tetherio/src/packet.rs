use itertools::Itertools;
use serde_json::{json, Value};

use crate::errors::Error;

/// Upper bound on announced binary attachments, to keep a malicious header
/// from reserving an arbitrary buffer count.
const MAX_ATTACHMENTS: usize = 255;

/// A socket.io packet, sent as the payload of an engine.io message.
///
/// On the wire: `<type>[<attachments>-][/<namespace>,][<ack id>][<json>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub inner: PacketData,
    /// The namespace path, `/` for the root namespace.
    pub ns: String,
    /// Query string carried by the client connect packet after the
    /// namespace path, e.g. `0/admin?token=1`. Never encoded back.
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    /// Connect to a namespace.
    Connect,
    /// Disconnect from a namespace, the engine.io session stays open.
    Disconnect,
    /// An event with json arguments and an optional ack id.
    Event(String, Value, Option<i64>),
    /// The response to an event, carrying the ack id it answers.
    EventAck(Value, i64),
    /// Connection refusal, e.g. for an unknown namespace.
    ConnectError(Value),
    /// An event with binary attachments.
    BinaryEvent(String, BinaryPacket, Option<i64>),
    /// An ack response with binary attachments.
    BinaryAck(BinaryPacket, i64),
}

/// Json arguments plus the binary attachments they reference.
///
/// Json cannot carry raw bytes, so each attachment is represented in the
/// arguments by a `{"_placeholder":true,"num":<n>}` object and the bytes
/// travel as separate binary packets right after this one.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPacket {
    /// The json arguments, stripped of their placeholders.
    pub data: Value,
    /// The attachment buffers, in placeholder order.
    pub bin: Vec<Vec<u8>>,
    /// The number of attachments announced in the header.
    payload_count: usize,
}

impl Packet {
    pub fn connect(ns: &str) -> Self {
        Self {
            inner: PacketData::Connect,
            ns: ns.to_string(),
            query: None,
        }
    }

    pub fn disconnect(ns: &str) -> Self {
        Self {
            inner: PacketData::Disconnect,
            ns: ns.to_string(),
            query: None,
        }
    }

    pub fn connect_error(ns: &str, message: &str) -> Self {
        Self {
            inner: PacketData::ConnectError(Value::String(message.to_string())),
            ns: ns.to_string(),
            query: None,
        }
    }

    pub fn event(ns: &str, e: &str, data: Value) -> Self {
        Self {
            inner: PacketData::Event(e.to_string(), data, None),
            ns: ns.to_string(),
            query: None,
        }
    }

    pub fn ack(ns: &str, data: Value, ack_id: i64) -> Self {
        Self {
            inner: PacketData::EventAck(data, ack_id),
            ns: ns.to_string(),
            query: None,
        }
    }

    pub fn bin_event(ns: &str, e: &str, data: Value, bin: Vec<Vec<u8>>) -> Self {
        Self {
            inner: PacketData::BinaryEvent(e.to_string(), BinaryPacket::outgoing(data, bin), None),
            ns: ns.to_string(),
            query: None,
        }
    }

    pub fn bin_ack(ns: &str, data: Value, bin: Vec<Vec<u8>>, ack_id: i64) -> Self {
        Self {
            inner: PacketData::BinaryAck(BinaryPacket::outgoing(data, bin), ack_id),
            ns: ns.to_string(),
            query: None,
        }
    }

    pub(crate) fn set_ack_id(&mut self, ack_id: i64) {
        match &mut self.inner {
            PacketData::Event(_, _, ack) | PacketData::BinaryEvent(_, _, ack) => {
                *ack = Some(ack_id)
            }
            _ => (),
        }
    }
}

impl PacketData {
    fn index(&self) -> char {
        match self {
            PacketData::Connect => '0',
            PacketData::Disconnect => '1',
            PacketData::Event(_, _, _) => '2',
            PacketData::EventAck(_, _) => '3',
            PacketData::ConnectError(_) => '4',
            PacketData::BinaryEvent(_, _, _) => '5',
            PacketData::BinaryAck(_, _) => '6',
        }
    }
}

impl BinaryPacket {
    /// Build a binary packet to send, the placeholders are appended to the
    /// argument list at encode time.
    pub fn outgoing(data: Value, bin: Vec<Vec<u8>>) -> Self {
        let data = match data {
            Value::Array(v) => Value::Array(v),
            Value::Null => Value::Array(vec![]),
            d => Value::Array(vec![d]),
        };
        let payload_count = bin.len();
        Self {
            data,
            bin,
            payload_count,
        }
    }

    /// Build a binary packet from an incoming header, the attachments
    /// arrive as separate binary packets.
    pub(crate) fn incoming(mut data: Value, payload_count: usize) -> Self {
        if let Value::Array(v) = &mut data {
            v.retain(|e| !is_placeholder(e));
        }
        Self {
            data: unwrap_single_arg(data),
            bin: Vec::with_capacity(payload_count),
            payload_count,
        }
    }

    pub(crate) fn add_payload(&mut self, payload: Vec<u8>) {
        self.bin.push(payload);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.bin.len() == self.payload_count
    }
}

fn is_placeholder(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.get("_placeholder").and_then(Value::as_bool) == Some(true))
        .unwrap_or(false)
}

/// Build the json argument array of an event: the event name followed by
/// the arguments, a top-level array being spread as multiple arguments.
fn event_args(e: &str, data: Value) -> Value {
    let mut args = vec![Value::String(e.to_string())];
    match data {
        Value::Array(v) => args.extend(v),
        Value::Null => (),
        d => args.push(d),
    }
    Value::Array(args)
}

impl TryFrom<Packet> for String {
    type Error = serde_json::Error;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        let mut res = packet.inner.index().to_string();

        // attachment count, only for binary packets
        match &packet.inner {
            PacketData::BinaryEvent(_, bin, _) | PacketData::BinaryAck(bin, _) => {
                res.push_str(&bin.payload_count.to_string());
                res.push('-');
            }
            _ => (),
        }

        if packet.ns != "/" && !packet.ns.is_empty() {
            res.push_str(&packet.ns);
            res.push(',');
        }

        match packet.inner {
            PacketData::Connect | PacketData::Disconnect => (),
            PacketData::Event(e, data, ack_id) => {
                if let Some(ack_id) = ack_id {
                    res.push_str(&ack_id.to_string());
                }
                res.push_str(&serde_json::to_string(&event_args(&e, data))?);
            }
            PacketData::EventAck(data, ack_id) => {
                res.push_str(&ack_id.to_string());
                // an ack payload is always an argument array
                let data = match data {
                    Value::Array(v) => Value::Array(v),
                    Value::Null => Value::Array(vec![]),
                    d => Value::Array(vec![d]),
                };
                res.push_str(&serde_json::to_string(&data)?);
            }
            PacketData::ConnectError(data) => {
                res.push_str(&serde_json::to_string(&data)?);
            }
            PacketData::BinaryEvent(e, bin, ack_id) => {
                if let Some(ack_id) = ack_id {
                    res.push_str(&ack_id.to_string());
                }
                let mut args = event_args(&e, bin.data);
                append_placeholders(&mut args, bin.payload_count);
                res.push_str(&serde_json::to_string(&args)?);
            }
            PacketData::BinaryAck(bin, ack_id) => {
                res.push_str(&ack_id.to_string());
                let mut args = match bin.data {
                    Value::Array(v) => Value::Array(v),
                    Value::Null => Value::Array(vec![]),
                    d => Value::Array(vec![d]),
                };
                append_placeholders(&mut args, bin.payload_count);
                res.push_str(&serde_json::to_string(&args)?);
            }
        }
        Ok(res)
    }
}

fn append_placeholders(args: &mut Value, count: usize) {
    if let Value::Array(v) = args {
        for num in 0..count {
            v.push(json!({ "_placeholder": true, "num": num }));
        }
    }
}

impl TryFrom<String> for Packet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let index = chars.next().ok_or(Error::InvalidPacketType)?;

        let attachments: usize = if matches!(index, '5' | '6') {
            let count: String = chars.take_while_ref(|c| c.is_ascii_digit()).collect();
            if chars.next() != Some('-') {
                return Err(Error::InvalidPacketType);
            }
            let count: usize = count.parse().map_err(|_| Error::InvalidPacketType)?;
            if count > MAX_ATTACHMENTS {
                return Err(Error::InvalidPacketType);
            }
            count
        } else {
            0
        };

        let (ns, query) = if chars.clone().next() == Some('/') {
            let ns: String = chars.take_while_ref(|c| *c != ',').collect();
            // the separator, absent when the namespace ends the packet
            chars.next();
            match ns.split_once('?') {
                Some((path, query)) => (path.to_string(), Some(query.to_string())),
                None => (ns, None),
            }
        } else {
            ("/".to_string(), None)
        };

        let ack: String = chars.take_while_ref(|c| c.is_ascii_digit()).collect();
        let ack_id: Option<i64> = if ack.is_empty() {
            None
        } else {
            Some(ack.parse().map_err(|_| Error::InvalidPacketType)?)
        };

        let payload = chars.as_str();
        let inner = match index {
            '0' => PacketData::Connect,
            '1' => PacketData::Disconnect,
            '2' => {
                let (e, data) = split_event_args(serde_json::from_str(payload)?)?;
                PacketData::Event(e, data, ack_id)
            }
            '3' => PacketData::EventAck(
                unwrap_single_arg(serde_json::from_str(payload)?),
                ack_id.ok_or(Error::InvalidPacketType)?,
            ),
            '4' => PacketData::ConnectError(serde_json::from_str(payload)?),
            '5' => {
                let (e, data) = split_event_name(serde_json::from_str(payload)?)?;
                PacketData::BinaryEvent(e, BinaryPacket::incoming(data, attachments), ack_id)
            }
            '6' => PacketData::BinaryAck(
                BinaryPacket::incoming(serde_json::from_str(payload)?, attachments),
                ack_id.ok_or(Error::InvalidPacketType)?,
            ),
            _ => return Err(Error::InvalidPacketType),
        };

        Ok(Packet { inner, ns, query })
    }
}

/// Unwrap a single-argument ack payload so handlers see the argument
/// itself rather than a one-element array.
fn unwrap_single_arg(data: Value) -> Value {
    match data {
        Value::Array(mut args) if args.len() == 1 => args.pop().unwrap_or(Value::Null),
        data => data,
    }
}

/// Split an incoming event array into the event name and the raw argument
/// array.
fn split_event_name(payload: Value) -> Result<(String, Value), Error> {
    match payload {
        Value::Array(mut args) if !args.is_empty() => {
            let e = match args.remove(0) {
                Value::String(e) => e,
                _ => return Err(Error::InvalidEventName),
            };
            Ok((e, Value::Array(args)))
        }
        _ => Err(Error::InvalidEventName),
    }
}

/// Split an incoming event array into the event name and the argument
/// payload. A single argument is unwrapped for the handlers.
fn split_event_args(payload: Value) -> Result<(String, Value), Error> {
    let (e, data) = split_event_name(payload)?;
    Ok((e, unwrap_single_arg(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(packet: Packet) -> String {
        packet.try_into().unwrap()
    }
    fn decode(value: &str) -> Packet {
        Packet::try_from(value.to_string()).unwrap()
    }

    #[test]
    fn connect_encoding() {
        assert_eq!(encode(Packet::connect("/")), "0");
        assert_eq!(encode(Packet::connect("/admin")), "0/admin,");
    }

    #[test]
    fn connect_decoding() {
        let packet = decode("0");
        assert_eq!(packet.inner, PacketData::Connect);
        assert_eq!(packet.ns, "/");

        let packet = decode("0/admin");
        assert_eq!(packet.inner, PacketData::Connect);
        assert_eq!(packet.ns, "/admin");
    }

    #[test]
    fn connect_decoding_with_query() {
        let packet = decode("0/admin?token=s3cr3t");
        assert_eq!(packet.ns, "/admin");
        assert_eq!(packet.query.as_deref(), Some("token=s3cr3t"));
    }

    #[test]
    fn disconnect_roundtrip() {
        assert_eq!(encode(Packet::disconnect("/admin")), "1/admin,");
        assert_eq!(decode("1/admin,").inner, PacketData::Disconnect);
    }

    #[test]
    fn event_encoding() {
        assert_eq!(
            encode(Packet::event("/", "chat", serde_json::json!("hello"))),
            "2[\"chat\",\"hello\"]"
        );
        assert_eq!(
            encode(Packet::event(
                "/admin",
                "chat",
                serde_json::json!(["hello", 42])
            )),
            "2/admin,[\"chat\",\"hello\",42]"
        );
    }

    #[test]
    fn event_encoding_with_ack_id() {
        let mut packet = Packet::event("/", "chat", serde_json::json!("hello"));
        packet.set_ack_id(12);
        assert_eq!(encode(packet), "212[\"chat\",\"hello\"]");
    }

    #[test]
    fn event_decoding() {
        let packet = decode("2[\"chat\",\"hello\"]");
        assert_eq!(
            packet.inner,
            PacketData::Event("chat".to_string(), serde_json::json!("hello"), None)
        );

        let packet = decode("2/admin,13[\"chat\",\"hello\",42]");
        assert_eq!(packet.ns, "/admin");
        assert_eq!(
            packet.inner,
            PacketData::Event(
                "chat".to_string(),
                serde_json::json!(["hello", 42]),
                Some(13)
            )
        );
    }

    #[test]
    fn ack_roundtrip() {
        assert_eq!(
            encode(Packet::ack("/", serde_json::json!("ok"), 12)),
            "312[\"ok\"]"
        );
        let packet = decode("312[\"ok\"]");
        assert_eq!(
            packet.inner,
            PacketData::EventAck(serde_json::json!("ok"), 12)
        );
    }

    #[test]
    fn connect_error_encoding() {
        assert_eq!(
            encode(Packet::connect_error("/", "Invalid namespace")),
            "4\"Invalid namespace\""
        );
    }

    #[test]
    fn binary_event_encoding() {
        let packet = Packet::bin_event("/", "bin", Value::Null, vec![vec![1, 2, 3]]);
        assert_eq!(encode(packet), "51-[\"bin\",{\"_placeholder\":true,\"num\":0}]");

        let packet = Packet::bin_event(
            "/admin",
            "bin",
            serde_json::json!(["hello"]),
            vec![vec![1], vec![2]],
        );
        assert_eq!(
            encode(packet),
            "52-/admin,[\"bin\",\"hello\",{\"_placeholder\":true,\"num\":0},{\"_placeholder\":true,\"num\":1}]"
        );
    }

    #[test]
    fn binary_event_decoding() {
        let packet = decode("51-[\"bin\",\"extra\",{\"_placeholder\":true,\"num\":0}]");
        match packet.inner {
            PacketData::BinaryEvent(e, bin, None) => {
                assert_eq!(e, "bin");
                assert_eq!(bin.data, serde_json::json!("extra"));
                assert!(!bin.is_complete());
            }
            p => panic!("unexpected packet: {p:?}"),
        }
    }

    #[test]
    fn binary_ack_roundtrip() {
        let packet = Packet::bin_ack("/", Value::Null, vec![vec![9]], 3);
        assert_eq!(encode(packet), "61-3[{\"_placeholder\":true,\"num\":0}]");

        let packet = decode("61-3[{\"_placeholder\":true,\"num\":0}]");
        match packet.inner {
            PacketData::BinaryAck(bin, 3) => assert_eq!(bin.data, serde_json::json!([])),
            p => panic!("unexpected packet: {p:?}"),
        }
    }

    #[test]
    fn rejects_malformed_packets() {
        assert!(Packet::try_from("".to_string()).is_err());
        assert!(Packet::try_from("9".to_string()).is_err());
        assert!(Packet::try_from("2[42]".to_string()).is_err());
        assert!(Packet::try_from("2{\"not\":\"array\"}".to_string()).is_err());
        assert!(Packet::try_from("5x-[\"bin\"]".to_string()).is_err());
        assert!(Packet::try_from("5999-[\"bin\"]".to_string()).is_err());
    }
}
