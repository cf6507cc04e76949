//! [`Parameter`], the tagged primitive-or-object value used for `Invoke`
//! arguments and `Array` elements.

use crate::protocol::io::{Parser, Serializer};
use crate::protocol::object::{read_tagged_object, write_tagged_object, MessageType, TaggedObject};
use crate::{Decode, DecodeError, Encode, EncodeError};

/// One encoded value. The variant determines the single-character
/// `encoding` tag written ahead of the value on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    I32(i32),
    U32(u32),
    I16(i16),
    U16(u16),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Object(Option<TaggedObject>),
}

impl Parameter {
    pub fn bool(value: bool) -> Self {
        Parameter::Bool(value)
    }

    pub fn object(value: TaggedObject) -> Self {
        Parameter::Object(Some(value))
    }

    fn encoding_char(&self) -> char {
        match self {
            Parameter::I32(_) => 'i',
            Parameter::U32(_) => 'I',
            Parameter::I16(_) => 's',
            Parameter::U16(_) => 'S',
            Parameter::F32(_) => 'f',
            Parameter::F64(_) => 'd',
            Parameter::Bool(_) => 'B',
            Parameter::Str(_) => '*',
            Parameter::Object(_) => '@',
        }
    }

    fn encode_value<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        match self {
            Parameter::I32(v) => ser.write_i32(*v),
            Parameter::U32(v) => ser.write_u32(*v),
            Parameter::I16(v) => ser.write_i16(*v),
            Parameter::U16(v) => ser.write_u16(*v),
            Parameter::F32(v) => ser.write_f32(*v),
            Parameter::F64(v) => ser.write_f64(*v),
            Parameter::Bool(v) => ser.write_bool(*v),
            Parameter::Str(v) => ser.write_utf(v),
            Parameter::Object(v) => write_tagged_object(ser, v.as_ref()),
        }
    }

    /// Writes `(encoding, value)`: primitives go straight to their own
    /// primitive encoding, and only `Object` recurses into a full
    /// tagged-object write. This is the resolved behavior for `Array`
    /// elements too (see the encoding note in the crate root docs).
    pub(crate) fn encode_element<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_utf(&self.encoding_char().to_string())?;
        self.encode_value(ser)
    }

    pub(crate) fn decode_element<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let encoding = par.read_utf()?;
        let c = encoding.chars().next().unwrap_or('\0');
        Ok(match c {
            'i' => Parameter::I32(par.read_i32()?),
            'I' => Parameter::U32(par.read_u32()?),
            's' => Parameter::I16(par.read_i16()?),
            'S' => Parameter::U16(par.read_u16()?),
            'f' => Parameter::F32(par.read_f32()?),
            'd' => Parameter::F64(par.read_f64()?),
            'B' => Parameter::Bool(par.read_bool()?),
            '*' => Parameter::Str(par.read_utf()?),
            '@' => Parameter::Object(read_tagged_object(par)?),
            other => return Err(DecodeError::UnknownEncoding(other)),
        })
    }
}

impl MessageType for Parameter {
    const CLASS_ID: u16 = 3;
}

impl Encode for Parameter {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        self.encode_element(ser)
    }
}

impl Decode for Parameter {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        Self::decode_element(par)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::io::{IoParser, IoSerializer};
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn roundtrip(p: &Parameter) -> bool {
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            p.encode(&mut ser).unwrap();
        }
        let mut par = IoParser(&buf[..]);
        &Parameter::decode(&mut par).unwrap() == p
    }

    impl Arbitrary for Parameter {
        fn arbitrary(g: &mut Gen) -> Self {
            match u8::arbitrary(g) % 8 {
                0 => Parameter::I32(i32::arbitrary(g)),
                1 => Parameter::U32(u32::arbitrary(g)),
                2 => Parameter::I16(i16::arbitrary(g)),
                3 => Parameter::U16(u16::arbitrary(g)),
                4 => Parameter::F32(f32::arbitrary(g)),
                5 => Parameter::F64(f64::arbitrary(g)),
                6 => Parameter::Bool(bool::arbitrary(g)),
                _ => Parameter::Str(String::arbitrary(g)),
            }
        }
    }

    #[quickcheck]
    fn roundtrip_parameter(p: Parameter) -> bool {
        roundtrip(&p)
    }

    #[quickcheck]
    fn u32_accepts_the_full_unsigned_range(v: u32) -> bool {
        roundtrip(&Parameter::U32(v))
    }

    #[quickcheck]
    fn i32_accepts_the_full_signed_range(v: i32) -> bool {
        roundtrip(&Parameter::I32(v))
    }

    #[test]
    fn encoding_chars_match_the_wire_table() {
        assert_eq!(Parameter::I32(0).encoding_char(), 'i');
        assert_eq!(Parameter::U32(0).encoding_char(), 'I');
        assert_eq!(Parameter::I16(0).encoding_char(), 's');
        assert_eq!(Parameter::U16(0).encoding_char(), 'S');
        assert_eq!(Parameter::F32(0.0).encoding_char(), 'f');
        assert_eq!(Parameter::F64(0.0).encoding_char(), 'd');
        assert_eq!(Parameter::Bool(false).encoding_char(), 'B');
        assert_eq!(Parameter::Str(String::new()).encoding_char(), '*');
        assert_eq!(Parameter::Object(None).encoding_char(), '@');
    }

    #[test]
    fn null_object_roundtrips() {
        assert!(roundtrip(&Parameter::Object(None)));
    }

    #[test]
    fn unknown_encoding_char_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            ser.write_utf("Q").unwrap();
        }
        let mut par = IoParser(&buf[..]);
        let err = Parameter::decode(&mut par).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEncoding('Q')));
    }
}
