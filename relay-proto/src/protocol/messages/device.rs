//! Device identity and addressing types: [`Device`], [`FlashDevice`],
//! [`DeviceAddress`], and the [`DeviceType`] enum.

use crate::protocol::io::{Parser, Serializer};
use crate::protocol::object::MessageType;
use crate::{Decode, DecodeError, Encode, EncodeError};

/// The client platform a connection identifies as. Games register as
/// `Flash` or `Unity`; everything else is treated as a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Any,
    Unity,
    IPhone,
    Flash,
    Android,
    Native,
    Palm,
    Server,
    /// An on-the-wire value outside the known set. Preserved rather than
    /// rejected, matching the original's lack of validation here.
    Unknown(i32),
}

impl DeviceType {
    pub fn is_game(self) -> bool {
        matches!(self, DeviceType::Flash | DeviceType::Unity)
    }

    pub(crate) fn as_i32(self) -> i32 {
        match self {
            DeviceType::Any => 0,
            DeviceType::Unity => 1,
            DeviceType::IPhone => 2,
            DeviceType::Flash => 3,
            DeviceType::Android => 4,
            DeviceType::Native => 5,
            DeviceType::Palm => 6,
            DeviceType::Server => 7,
            DeviceType::Unknown(v) => v,
        }
    }

    pub(crate) fn from_i32(value: i32) -> Self {
        match value {
            0 => DeviceType::Any,
            1 => DeviceType::Unity,
            2 => DeviceType::IPhone,
            3 => DeviceType::Flash,
            4 => DeviceType::Android,
            5 => DeviceType::Native,
            6 => DeviceType::Palm,
            7 => DeviceType::Server,
            other => DeviceType::Unknown(other),
        }
    }
}

/// An endpoint's host/port, with the original's quirk of writing `port`
/// twice on the wire (and only the second copy being read back).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl MessageType for DeviceAddress {
    const CLASS_ID: u16 = 1;
}

impl Encode for DeviceAddress {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_utf(&self.host)?;
        ser.write_i32(self.port as i32)?;
        // Written twice on the wire; preserved verbatim rather than
        // "fixed", since the read side depends on this exact shape.
        ser.write_i32(self.port as i32)
    }
}

impl Decode for DeviceAddress {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let host = par.read_utf()?;
        let _discarded = par.read_i32()?;
        let port = par.read_i32()?;
        Ok(DeviceAddress {
            host,
            port: port as u16,
        })
    }
}

/// A registered client's identity. `address` is never part of `Device`'s
/// own wire encoding: it is only ever populated by external binding (see
/// `RegistryInfo::decode`), mirroring the original's plain, unserialized
/// `address` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_type: DeviceType,
    pub device_id: String,
    pub device_name: String,
    pub address: Option<DeviceAddress>,
}

impl MessageType for Device {
    const CLASS_ID: u16 = 0xFFFF; // Device itself is never registered; only FlashDevice is.
}

impl Encode for Device {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_i32(self.device_type.as_i32())?;
        ser.write_utf(&self.device_id)?;
        ser.write_utf(&self.device_name)
    }
}

impl Decode for Device {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let device_type = DeviceType::from_i32(par.read_i32()?);
        let device_id = par.read_utf()?;
        let device_name = par.read_utf()?;
        Ok(Device {
            device_type,
            device_id,
            device_name,
            address: None,
        })
    }
}

/// Wire-identical to [`Device`]; the distinct class IDs exist only so the
/// registry can tell "this is a flash/unity game" registrations apart from
/// plain `Device` uses without an extra field on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct FlashDevice(pub Device);

impl FlashDevice {
    /// Builds a server-identity `FlashDevice`, the shape used for the
    /// server's own entry in registration replies and ping responses.
    pub fn server_identity(device_id: String, device_name: String, address: DeviceAddress) -> Self {
        FlashDevice(Device {
            device_type: DeviceType::Server,
            device_id,
            device_name,
            address: Some(address),
        })
    }
}

impl MessageType for FlashDevice {
    const CLASS_ID: u16 = 7;
}

impl Encode for FlashDevice {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        self.0.encode(ser)
    }
}

impl Decode for FlashDevice {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        Ok(FlashDevice(Device::decode(par)?))
    }
}
