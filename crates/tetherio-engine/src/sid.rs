use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A session id, unique per engine instance.
///
/// Ids are allocated from a monotonic counter and rendered in base36
/// so they stay short on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(u64);

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

impl Sid {
    pub(crate) const fn new(id: u64) -> Self {
        Sid(id)
    }

    /// A `Sid` that never matches an allocated session id. Used for
    /// detached sockets in tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub const ZERO: Sid = Sid(0);
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; 13]; // u64::MAX is 13 base36 digits
        let mut i = buf.len();
        let mut n = self.0;
        loop {
            i -= 1;
            buf[i] = ALPHABET[(n % 36) as usize];
            n /= 36;
            if n == 0 {
                break;
            }
        }
        // SAFETY-free: the alphabet is pure ASCII
        f.write_str(std::str::from_utf8(&buf[i..]).unwrap_or_default())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid session id")]
pub struct InvalidSid;

impl FromStr for Sid {
    type Err = InvalidSid;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 13 {
            return Err(InvalidSid);
        }
        u64::from_str_radix(s, 36).map(Sid).map_err(|_| InvalidSid)
    }
}

impl Serialize for Sid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <&str as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_base36() {
        assert_eq!(Sid::new(1).to_string(), "1");
        assert_eq!(Sid::new(35).to_string(), "z");
        assert_eq!(Sid::new(36).to_string(), "10");
        assert_eq!(Sid::new(12345678).to_string(), "7clzi");
    }

    #[test]
    fn parse_roundtrip() {
        for id in [1u64, 36, 1000, u64::MAX] {
            let sid = Sid::new(id);
            assert_eq!(sid.to_string().parse::<Sid>().unwrap(), sid);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Sid>().is_err());
        assert!("!!!".parse::<Sid>().is_err());
        assert!("zzzzzzzzzzzzzz".parse::<Sid>().is_err());
    }

    #[test]
    fn serde_as_string() {
        let sid = Sid::new(42);
        assert_eq!(serde_json::to_string(&sid).unwrap(), "\"16\"");
        let back: Sid = serde_json::from_str("\"16\"").unwrap();
        assert_eq!(back, sid);
    }
}
