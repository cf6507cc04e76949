//! Outer frame: `u32` total length (covering everything after itself)
//! followed by the tagged-object encoding of a single [`Packet`].
//!
//! Framing is a simple length-prefix protocol, not the start/end-marker,
//! CRC'd, obfuscated byte stream the embedded radio link this crate's
//! layout is modeled on uses — so unlike that protocol's frame scanner,
//! extracting a frame here never needs to search for a marker sequence,
//! only to wait for enough buffered bytes.

use crate::error::{DecodeError, EncodeError};
use crate::protocol::io::{IoParser, IoSerializer};
use crate::protocol::{Packet, TaggedObject};

pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encodes a [`Packet`] into a complete outer frame: length prefix plus
/// the tagged-object body.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::new();
    {
        let mut ser = IoSerializer(&mut body);
        crate::protocol::object::write_tagged_object(
            &mut ser,
            Some(&TaggedObject::Packet(Box::new(packet.clone()))),
        )?;
    }
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decodes a single already-delimited frame body (the bytes *after* the
/// length prefix) into a [`Packet`].
pub fn decode_frame(body: &[u8]) -> Result<Packet, DecodeError> {
    let mut par = IoParser(body);
    let obj = crate::protocol::object::read_tagged_object(&mut par)?
        .ok_or(DecodeError::UnexpectedNull)?;
    match obj {
        TaggedObject::Packet(p) => Ok(*p),
        _ => Err(DecodeError::UnexpectedNull),
    }
}

/// Accumulates raw bytes read off a socket and yields complete frame
/// bodies as they become available. Mirrors the growable-buffer framing
/// pattern used for the embedded radio link, simplified to this
/// protocol's plain length-prefix shape (no marker search, no CRC).
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buf: Vec<u8>,
}

impl FrameExtractor {
    pub fn new() -> Self {
        FrameExtractor { buf: Vec::new() }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pulls out the next complete frame body, if one is fully buffered.
    /// Returns `Err` if the declared length exceeds `max_frame_size`,
    /// which the caller should treat as a fatal protocol error for this
    /// connection (there is no way to resynchronize a length-prefixed
    /// stream once a bogus length has been read).
    pub fn next_frame(&mut self, max_frame_size: u32) -> Result<Option<Vec<u8>>, DecodeError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let declared = u32::from_le_bytes(self.buf[0..4].try_into().unwrap());
        if declared > max_frame_size {
            return Err(DecodeError::FrameTooLarge {
                declared,
                max: max_frame_size,
            });
        }
        let total = LENGTH_PREFIX_SIZE + declared as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let body = self.buf[LENGTH_PREFIX_SIZE..total].to_vec();
        self.buf.drain(0..total);
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DeviceType, PacketType};

    #[test]
    fn round_trips_a_minimal_packet() {
        let packet = Packet::new(
            1,
            PacketType::Data,
            DeviceType::Flash,
            "dev".into(),
            "name".into(),
            None,
        );
        let frame = encode_frame(&packet).unwrap();
        let mut extractor = FrameExtractor::new();
        extractor.feed(&frame);
        let body = extractor.next_frame(65536).unwrap().unwrap();
        let decoded = decode_frame(&body).unwrap();
        assert_eq!(decoded.device_id, "dev");
        assert_eq!(decoded.sequence, 1);
        assert!(decoded.message.is_none());
    }

    #[test]
    fn extractor_waits_for_a_partial_frame() {
        let packet = Packet::new(1, PacketType::Data, DeviceType::Flash, "a".into(), "b".into(), None);
        let frame = encode_frame(&packet).unwrap();
        let mut extractor = FrameExtractor::new();
        extractor.feed(&frame[..frame.len() - 1]);
        assert!(extractor.next_frame(65536).unwrap().is_none());
        extractor.feed(&frame[frame.len() - 1..]);
        assert!(extractor.next_frame(65536).unwrap().is_some());
    }

    #[test]
    fn extractor_rejects_oversized_declared_length() {
        let mut extractor = FrameExtractor::new();
        extractor.feed(&100_000u32.to_le_bytes());
        let err = extractor.next_frame(65536).unwrap_err();
        assert!(matches!(err, DecodeError::FrameTooLarge { .. }));
    }
}
