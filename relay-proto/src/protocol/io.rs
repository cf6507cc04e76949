//! Primitive little-endian encode/decode, matching the wire layout used
//! throughout the registry protocol: fixed-width integers and floats in
//! little-endian order, booleans as a single byte, and UTF-8 strings as a
//! `u16` byte-length prefix followed by the raw bytes (no terminator).

use std::io::{self, Read, Write};

use crate::error::{DecodeError, EncodeError};

/// A sink for the primitive wire types. Only [`Serializer::write_bytes`] is
/// required; everything else has a default implementation built on top of
/// it, so a new backing store only needs to implement that one method.
pub trait Serializer {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), EncodeError>;

    fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_bytes(&[value])
    }

    fn write_bool(&mut self, value: bool) -> Result<(), EncodeError> {
        self.write_u8(value as u8)
    }

    fn write_i16(&mut self, value: i16) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_f32(&mut self, value: f32) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_f64(&mut self, value: f64) -> Result<(), EncodeError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// `u16` byte length prefix followed by the UTF-8 bytes of `value`.
    fn write_utf(&mut self, value: &str) -> Result<(), EncodeError> {
        let bytes = value.as_bytes();
        self.write_u16(bytes.len() as u16)?;
        self.write_bytes(bytes)
    }
}

impl<S: Serializer + ?Sized> Serializer for &mut S {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), EncodeError> {
        (**self).write_bytes(buf)
    }
}

/// Wraps any [`Write`] implementation as a [`Serializer`].
pub struct IoSerializer<W>(pub W);

impl<W: Write> Serializer for IoSerializer<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), EncodeError> {
        self.0.write_all(buf).map_err(EncodeError::from)
    }
}

/// A source for the primitive wire types, the read-side counterpart of
/// [`Serializer`].
pub trait Parser {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), DecodeError>;

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn read_utf(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u16()? as usize;
        let mut buf = vec![0u8; len];
        self.read_bytes(&mut buf)?;
        String::from_utf8(buf).map_err(|_| DecodeError::BadUtf8)
    }
}

impl<P: Parser + ?Sized> Parser for &mut P {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        (**self).read_bytes(buf)
    }
}

/// Wraps any [`Read`] implementation (here, always a byte slice holding one
/// fully-buffered frame) as a [`Parser`].
pub struct IoParser<R>(pub R);

impl<R: Read> Parser for IoParser<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.0.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                DecodeError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "short frame"))
            } else {
                DecodeError::Io(e)
            }
        })
    }
}
