//! The 12-byte version handshake the server writes immediately after
//! accepting a connection. The server never parses one of these back from
//! a client — see the framing note in the crate root docs — so only
//! encoding is implemented.

use crate::protocol::io::Serializer;
use crate::error::EncodeError;

/// A `major.minor.build` version, packed on the wire as four bytes in
/// `[build_lo, build_hi, minor, major]` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version8Bit {
    pub major: u8,
    pub minor: u8,
    pub build: u16,
}

impl Version8Bit {
    pub const fn new(major: u8, minor: u8, build: u16) -> Self {
        Version8Bit { major, minor, build }
    }

    fn write<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        let [build_lo, build_hi] = self.build.to_le_bytes();
        ser.write_u8(build_lo)?;
        ser.write_u8(build_hi)?;
        ser.write_u8(self.minor)?;
        ser.write_u8(self.major)
    }
}

/// The protocol version this server speaks. Both `current` and `min` are
/// the same value: there is no version negotiation, only an announcement.
pub const PROTOCOL_VERSION: Version8Bit = Version8Bit::new(2, 0, 0);

/// Writes the 12-byte handshake: a hardcoded `u32(8)` byte-count for the
/// two `Version8Bit` blocks that follow, then `current`, then `min`.
pub fn write_handshake<S: Serializer>(
    ser: &mut S,
    current: Version8Bit,
    min: Version8Bit,
) -> Result<(), EncodeError> {
    ser.write_u32(8)?;
    current.write(ser)?;
    min.write(ser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::io::IoSerializer;

    #[test]
    fn handshake_matches_known_bytes() {
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            write_handshake(&mut ser, PROTOCOL_VERSION, PROTOCOL_VERSION).unwrap();
        }
        assert_eq!(
            buf,
            vec![0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02]
        );
    }
}
