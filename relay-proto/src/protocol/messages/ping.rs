//! [`Ping`] and [`ByteChunk`]. `ByteChunk`'s wire format is implemented for
//! completeness (it holds a registered class ID) but no dispatch path in
//! this crate or the server ever constructs or routes one.

use crate::protocol::io::{Parser, Serializer};
use crate::protocol::object::{read_tagged_object, write_tagged_object, MessageType, TaggedObject};
use crate::{Decode, DecodeError, Encode, EncodeError};

#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    pub device_id: String,
    pub address: Option<TaggedObject>,
}

impl MessageType for Ping {
    const CLASS_ID: u16 = 11;
}

impl Encode for Ping {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_utf(&self.device_id)?;
        write_tagged_object(ser, self.address.as_ref())
    }
}

impl Decode for Ping {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let device_id = par.read_utf()?;
        let address = read_tagged_object(par)?;
        Ok(Ping { device_id, address })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ByteChunk {
    pub set_id: String,
    pub start_byte: i32,
    pub chunk_size: i32,
    pub total_size: i32,
    pub bytes: Vec<u8>,
}

impl MessageType for ByteChunk {
    const CLASS_ID: u16 = 14;
}

impl Encode for ByteChunk {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_utf(&self.set_id)?;
        ser.write_i32(self.start_byte)?;
        ser.write_i32(self.chunk_size)?;
        ser.write_i32(self.total_size)?;
        let start = self.start_byte.max(0) as usize;
        let end = (start + self.chunk_size.max(0) as usize).min(self.bytes.len());
        let slice = self.bytes.get(start..end).unwrap_or(&[]);
        ser.write_bytes(slice)
    }
}

impl Decode for ByteChunk {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let set_id = par.read_utf()?;
        let start_byte = par.read_i32()?;
        let chunk_size = par.read_i32()?;
        let total_size = par.read_i32()?;
        // `chunk_size` is an untrusted wire value; it must not size an
        // upfront allocation (a declared size near `i32::MAX` would force
        // a multi-gigabyte zeroed buffer before a single byte is actually
        // read). Grow the buffer in bounded steps, which fails as soon as
        // the underlying frame runs out of bytes rather than allocating
        // ahead of what's actually there.
        const STEP: usize = 8192;
        let mut remaining = chunk_size.max(0) as usize;
        let mut bytes = Vec::with_capacity(remaining.min(STEP));
        while remaining > 0 {
            let take = remaining.min(STEP);
            let start = bytes.len();
            bytes.resize(start + take, 0);
            par.read_bytes(&mut bytes[start..])?;
            remaining -= take;
        }
        Ok(ByteChunk {
            set_id,
            start_byte,
            chunk_size,
            total_size,
            bytes,
        })
    }
}
