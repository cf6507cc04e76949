//! The outer envelope every frame on the wire is an instance of.

use crate::protocol::io::{Parser, Serializer};
use crate::protocol::messages::device::DeviceType;
use crate::protocol::object::{read_tagged_object, write_tagged_object, MessageType, TaggedObject};
use crate::{Decode, DecodeError, Encode, EncodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data,
    Ping,
    Ack,
    Echo,
    Analysis,
    KeepAlive,
    Unknown(i32),
}

impl PacketType {
    fn as_i32(self) -> i32 {
        match self {
            PacketType::Data => 0,
            PacketType::Ping => 1,
            PacketType::Ack => 2,
            PacketType::Echo => 3,
            PacketType::Analysis => 4,
            PacketType::KeepAlive => 5,
            PacketType::Unknown(v) => v,
        }
    }

    fn from_i32(value: i32) -> Self {
        match value {
            0 => PacketType::Data,
            1 => PacketType::Ping,
            2 => PacketType::Ack,
            3 => PacketType::Echo,
            4 => PacketType::Analysis,
            5 => PacketType::KeepAlive,
            other => PacketType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub channel: i32,
    pub sequence: i32,
    pub timestamp: f64,
    pub rtt: f64,
    pub packet_type: PacketType,
    pub device_type: DeviceType,
    pub device_id: String,
    pub device_name: String,
    pub message: Option<TaggedObject>,
}

impl Packet {
    pub fn new(
        sequence: i32,
        packet_type: PacketType,
        device_type: DeviceType,
        device_id: String,
        device_name: String,
        message: Option<TaggedObject>,
    ) -> Self {
        Packet {
            channel: 0,
            sequence,
            timestamp: 0.0,
            rtt: 0.0,
            packet_type,
            device_type,
            device_id,
            device_name,
            message,
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl MessageType for Packet {
    const CLASS_ID: u16 = 0;
}

impl Encode for Packet {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_i32(self.channel)?;
        ser.write_i32(self.sequence)?;
        ser.write_f64(self.timestamp)?;
        ser.write_f64(self.rtt)?;
        ser.write_i32(self.packet_type.as_i32())?;
        ser.write_i32(self.device_type.as_i32())?;
        ser.write_utf(&self.device_id)?;
        ser.write_utf(&self.device_name)?;
        ser.write_bool(self.message.is_some())?;
        if self.message.is_some() {
            write_tagged_object(ser, self.message.as_ref())?;
        }
        Ok(())
    }
}

impl Decode for Packet {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let channel = par.read_i32()?;
        let sequence = par.read_i32()?;
        let timestamp = par.read_f64()?;
        let rtt = par.read_f64()?;
        let packet_type = PacketType::from_i32(par.read_i32()?);
        let device_type = DeviceType::from_i32(par.read_i32()?);
        let device_id = par.read_utf()?;
        let device_name = par.read_utf()?;
        let has_message = par.read_bool()?;
        let message = if has_message {
            read_tagged_object(par)?
        } else {
            None
        };
        Ok(Packet {
            channel,
            sequence,
            timestamp,
            rtt,
            packet_type,
            device_type,
            device_id,
            device_name,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::io::{IoParser, IoSerializer};
    use crate::protocol::messages::Invoke;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn roundtrip(p: &Packet) -> bool {
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            p.encode(&mut ser).unwrap();
        }
        let mut par = IoParser(&buf[..]);
        &Packet::decode(&mut par).unwrap() == p
    }

    impl Arbitrary for PacketType {
        fn arbitrary(g: &mut Gen) -> Self {
            PacketType::from_i32(*g.choose(&[0, 1, 2, 3, 4, 5]).unwrap())
        }
    }

    impl Arbitrary for DeviceType {
        fn arbitrary(g: &mut Gen) -> Self {
            DeviceType::from_i32(*g.choose(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap())
        }
    }

    impl Arbitrary for Packet {
        fn arbitrary(g: &mut Gen) -> Self {
            Packet {
                channel: i32::arbitrary(g),
                sequence: i32::arbitrary(g),
                timestamp: f64::arbitrary(g),
                rtt: f64::arbitrary(g),
                packet_type: PacketType::arbitrary(g),
                device_type: DeviceType::arbitrary(g),
                device_id: String::arbitrary(g),
                device_name: String::arbitrary(g),
                message: None,
            }
        }
    }

    #[quickcheck]
    fn roundtrip_packet_without_a_message(p: Packet) -> bool {
        roundtrip(&p)
    }

    #[test]
    fn roundtrip_packet_carrying_an_invoke_message() {
        let invoke = Invoke::new(5, "onList");
        let packet = Packet::new(
            5,
            PacketType::Data,
            DeviceType::Server,
            "srv".into(),
            "Registry".into(),
            Some(TaggedObject::Invoke(Box::new(invoke))),
        );
        assert!(roundtrip(&packet));
    }

    #[test]
    fn absent_message_writes_false_and_no_tagged_object() {
        let packet = Packet::new(1, PacketType::KeepAlive, DeviceType::Any, "a".into(), "b".into(), None);
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            packet.encode(&mut ser).unwrap();
        }
        let decoded = {
            let mut par = IoParser(&buf[..]);
            Packet::decode(&mut par).unwrap()
        };
        assert!(decoded.message.is_none());
    }
}
