//! Tagged-object encoding: the mechanism used anywhere a value's concrete
//! type isn't known statically (an `Invoke`'s parameters, a `Packet`'s
//! payload, `Parameter`/`Array` elements with encoding `'@'`, ...).
//!
//! On the wire a tagged object is `tag: UTF` (at most one character),
//! `class_id: u16`, then the body — unless `tag == ""` and `class_id == 0`,
//! which is the sentinel for "no value".

use crate::protocol::io::{Parser, Serializer};
use crate::protocol::messages::{
    ByteChunk, DeviceAddress, FlashDevice, Invoke, Packet, Parameter, Ping, RegistryInfo,
};
use crate::{DecodeError, EncodeError};

/// A statically-known class ID for a message type. Several IDs may alias
/// the same type (see [`FlashDevice`]); [`MessageType::CLASS_ID`] is always
/// the *preferred* id used when encoding.
pub trait MessageType {
    const CLASS_ID: u16;
}

pub trait Encode {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError>;
}

pub trait Decode: Sized {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError>;
}

/// Any value that can appear behind a tagged-object slot.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedObject {
    Packet(Box<Packet>),
    DeviceAddress(DeviceAddress),
    FlashDevice(FlashDevice),
    Parameter(Box<Parameter>),
    Invoke(Box<Invoke>),
    Ping(Box<Ping>),
    ByteChunk(Box<ByteChunk>),
    RegistryInfo(Box<RegistryInfo>),
    Array(Array),
}

/// A homogeneous-on-the-wire but dynamically-typed list, encoded as a
/// `u16` length followed by `(encoding, value)` pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array(pub Vec<Parameter>);

pub fn write_tagged_object<S: Serializer>(
    ser: &mut S,
    obj: Option<&TaggedObject>,
) -> Result<(), EncodeError> {
    match obj {
        None => {
            ser.write_utf("")?;
            ser.write_u16(0)
        }
        Some(obj) => {
            ser.write_utf("@")?;
            match obj {
                TaggedObject::Packet(p) => {
                    ser.write_u16(Packet::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::DeviceAddress(p) => {
                    ser.write_u16(DeviceAddress::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::FlashDevice(p) => {
                    ser.write_u16(FlashDevice::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::Parameter(p) => {
                    ser.write_u16(Parameter::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::Invoke(p) => {
                    ser.write_u16(Invoke::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::Ping(p) => {
                    ser.write_u16(Ping::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::ByteChunk(p) => {
                    ser.write_u16(ByteChunk::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::RegistryInfo(p) => {
                    ser.write_u16(RegistryInfo::CLASS_ID)?;
                    p.encode(ser)
                }
                TaggedObject::Array(p) => {
                    ser.write_u16(ARRAY_CLASS_ID)?;
                    p.encode(ser)
                }
            }
        }
    }
}

pub const ARRAY_CLASS_ID: u16 = 21;

impl TaggedObject {
    /// The device address bound onto a `FlashDevice` payload, if any.
    /// Used to bind `RegistryInfo::device.address` after decode, and to
    /// read it back out when re-encoding.
    pub fn device_address(&self) -> Option<DeviceAddress> {
        match self {
            TaggedObject::FlashDevice(d) => d.0.address.clone(),
            _ => None,
        }
    }

    pub fn set_device_address(&mut self, address: DeviceAddress) {
        if let TaggedObject::FlashDevice(d) = self {
            d.0.address = Some(address);
        }
    }
}

/// Reads a tagged object. `Ok(None)` covers both the explicit null
/// sentinel and a class ID with no registered type: the latter is logged
/// by the caller (this function has no logging dependency of its own) and
/// treated identically to null, per the wire contract.
pub fn read_tagged_object<P: Parser>(
    par: &mut P,
) -> Result<Option<TaggedObject>, DecodeError> {
    let tag = par.read_utf()?;
    if tag.len() > 1 {
        return Err(DecodeError::BadTag);
    }
    let class_id = par.read_u16()?;
    if tag.is_empty() && class_id == 0 {
        return Ok(None);
    }
    let obj = match class_id {
        0 => TaggedObject::Packet(Box::new(Packet::decode(par)?)),
        1 => TaggedObject::DeviceAddress(DeviceAddress::decode(par)?),
        3 => TaggedObject::Parameter(Box::new(Parameter::decode(par)?)),
        4 => TaggedObject::Invoke(Box::new(Invoke::decode(par)?)),
        7 | 8 | 10 | 15 | 16 | 17 | 18 => {
            TaggedObject::FlashDevice(FlashDevice::decode(par)?)
        }
        11 => TaggedObject::Ping(Box::new(Ping::decode(par)?)),
        14 => TaggedObject::ByteChunk(Box::new(ByteChunk::decode(par)?)),
        19 => TaggedObject::RegistryInfo(Box::new(RegistryInfo::decode(par)?)),
        21 => TaggedObject::Array(Array::decode(par)?),
        _unknown => return Ok(None),
    };
    Ok(Some(obj))
}

impl Encode for Array {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_i16(self.0.len() as i16)?;
        for param in &self.0 {
            param.encode_element(ser)?;
        }
        Ok(())
    }
}

impl Decode for Array {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let len = par.read_i16()?;
        let mut out = Vec::with_capacity(len.max(0) as usize);
        for _ in 0..len {
            out.push(Parameter::decode_element(par)?);
        }
        Ok(Array(out))
    }
}
