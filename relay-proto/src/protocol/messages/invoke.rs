//! [`Invoke`] (a remote-method call carrying a parameter list) and
//! [`RegistryInfo`] (the registration-response payload).

use crate::protocol::io::{Parser, Serializer};
use crate::protocol::object::{MessageType, TaggedObject};
use crate::{Decode, DecodeError, Encode, EncodeError, Parameter};

#[derive(Debug, Clone, PartialEq)]
pub struct Invoke {
    pub id: i32,
    pub method: String,
    pub return_method: String,
    pub params: Vec<Parameter>,
}

impl Invoke {
    pub fn new(id: i32, method: impl Into<String>) -> Self {
        Invoke {
            id,
            method: method.into(),
            return_method: String::new(),
            params: Vec::new(),
        }
    }

    pub fn with_return_method(mut self, return_method: impl Into<String>) -> Self {
        self.return_method = return_method.into();
        self
    }

    pub fn with_params(mut self, params: Vec<Parameter>) -> Self {
        self.params = params;
        self
    }
}

impl MessageType for Invoke {
    const CLASS_ID: u16 = 4;
}

impl Encode for Invoke {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        ser.write_i32(self.id)?;
        ser.write_utf(&self.method)?;
        ser.write_utf(&self.return_method)?;
        ser.write_i32(self.params.len() as i32)?;
        for param in &self.params {
            crate::protocol::object::write_tagged_object(
                ser,
                Some(&TaggedObject::Parameter(Box::new(param.clone()))),
            )?;
        }
        Ok(())
    }
}

impl Decode for Invoke {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let id = par.read_i32()?;
        let method = par.read_utf()?;
        let return_method = par.read_utf()?;
        let num_params = par.read_i32()?;
        // `num_params` is an untrusted wire value; it must not size an
        // upfront allocation (a declared count near `i32::MAX` would force
        // an enormous `Vec` reservation before a single parameter is
        // actually read). Grow the vector only as elements decode.
        let mut params = Vec::new();
        for _ in 0..num_params.max(0) {
            let obj = crate::protocol::object::read_tagged_object(par)?
                .ok_or(DecodeError::UnexpectedNull)?;
            match obj {
                TaggedObject::Parameter(p) => params.push(*p),
                other => params.push(Parameter::Object(Some(other))),
            }
        }
        Ok(Invoke {
            id,
            method,
            return_method,
            params,
        })
    }
}

/// The registration-response payload: the server's own device identity
/// plus slot/capacity bookkeeping. `device`'s address is bound in from
/// `address` immediately after decode, matching the back-reference the
/// original sets up (`self._device.address = self._address`).
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryInfo {
    pub device: TaggedObject,
    pub app_id: String,
    pub slot_id: i16,
    /// `(current_clients, max_clients)`, present only when `slot_id > 0`.
    pub clients: Option<(i16, i16)>,
}

impl MessageType for RegistryInfo {
    const CLASS_ID: u16 = 19;
}

impl Encode for RegistryInfo {
    fn encode<S: Serializer>(&self, ser: &mut S) -> Result<(), EncodeError> {
        crate::protocol::object::write_tagged_object(ser, Some(&self.device))?;
        let address = self
            .device
            .device_address()
            .ok_or(EncodeError::MissingField("address"))?;
        crate::protocol::object::write_tagged_object(
            ser,
            Some(&TaggedObject::DeviceAddress(address)),
        )?;
        ser.write_utf(&self.app_id)?;
        ser.write_i16(self.slot_id)?;
        if self.slot_id > 0 {
            // A positive slot_id must carry client counts on the wire, or
            // `decode` (which unconditionally reads two more i16s whenever
            // slot_id > 0) desynchronizes on the next field.
            let (current, max) = self.clients.ok_or(EncodeError::MissingField("clients"))?;
            ser.write_i16(current)?;
            ser.write_i16(max)?;
        }
        Ok(())
    }
}

impl Decode for RegistryInfo {
    fn decode<P: Parser>(par: &mut P) -> Result<Self, DecodeError> {
        let mut device = crate::protocol::object::read_tagged_object(par)?
            .ok_or(DecodeError::UnexpectedNull)?;
        let address_obj = crate::protocol::object::read_tagged_object(par)?
            .ok_or(DecodeError::UnexpectedNull)?;
        let address = match address_obj {
            TaggedObject::DeviceAddress(a) => a,
            _ => return Err(DecodeError::UnexpectedNull),
        };
        device.set_device_address(address);
        let app_id = par.read_utf()?;
        let slot_id = par.read_i16()?;
        let clients = if slot_id > 0 {
            let current = par.read_i16()?;
            let max = par.read_i16()?;
            Some((current, max))
        } else {
            None
        };
        Ok(RegistryInfo {
            device,
            app_id,
            slot_id,
            clients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::io::{IoParser, IoSerializer};
    use crate::protocol::messages::device::{Device, DeviceAddress, DeviceType, FlashDevice};

    fn roundtrip<M: Encode + Decode + PartialEq + std::fmt::Debug>(msg: &M) {
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            msg.encode(&mut ser).unwrap();
        }
        let mut par = IoParser(&buf[..]);
        assert_eq!(&M::decode(&mut par).unwrap(), msg);
    }

    fn device_with_address(id: &str) -> FlashDevice {
        FlashDevice(Device {
            device_type: DeviceType::Flash,
            device_id: id.to_string(),
            device_name: "a game".to_string(),
            address: Some(DeviceAddress {
                host: "10.0.0.1".to_string(),
                port: 9001,
            }),
        })
    }

    #[test]
    fn invoke_with_no_params_roundtrips() {
        roundtrip(&Invoke::new(1, "registry.list"));
    }

    #[test]
    fn invoke_with_primitive_params_roundtrips() {
        let invoke = Invoke::new(42, "registry.relay")
            .with_return_method("onRelayed")
            .with_params(vec![
                Parameter::I32(7),
                Parameter::Str("payload".to_string()),
                Parameter::bool(true),
            ]);
        roundtrip(&invoke);
    }

    #[test]
    fn registry_info_without_slot_omits_client_counts() {
        let info = RegistryInfo {
            device: TaggedObject::FlashDevice(device_with_address("ctrl-1")),
            app_id: "Registry".to_string(),
            slot_id: 0,
            clients: None,
        };
        roundtrip(&info);
    }

    #[test]
    fn registry_info_with_slot_carries_client_counts() {
        let info = RegistryInfo {
            device: TaggedObject::FlashDevice(device_with_address("game-1")),
            app_id: "MyGame".to_string(),
            slot_id: 3,
            clients: Some((1, 2)),
        };
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            info.encode(&mut ser).unwrap();
        }
        let mut par = IoParser(&buf[..]);
        let decoded = RegistryInfo::decode(&mut par).unwrap();
        assert_eq!(decoded.slot_id, 3);
        assert_eq!(decoded.clients, Some((1, 2)));
        assert_eq!(decoded.app_id, "MyGame");
    }

    #[test]
    fn registry_info_encode_fails_without_a_bound_address() {
        let info = RegistryInfo {
            device: TaggedObject::FlashDevice(FlashDevice(Device {
                device_type: DeviceType::Android,
                device_id: "ctrl-1".to_string(),
                device_name: String::new(),
                address: None,
            })),
            app_id: "Registry".to_string(),
            slot_id: 0,
            clients: None,
        };
        let mut buf = Vec::new();
        let mut ser = IoSerializer(&mut buf);
        assert!(matches!(info.encode(&mut ser), Err(EncodeError::MissingField("address"))));
    }

    #[test]
    fn registry_info_encode_fails_with_a_positive_slot_and_no_client_counts() {
        let info = RegistryInfo {
            device: TaggedObject::FlashDevice(device_with_address("game-1")),
            app_id: "MyGame".to_string(),
            slot_id: 3,
            clients: None,
        };
        let mut buf = Vec::new();
        let mut ser = IoSerializer(&mut buf);
        assert!(matches!(info.encode(&mut ser), Err(EncodeError::MissingField("clients"))));
    }

    #[test]
    fn invoke_decode_does_not_preallocate_from_a_huge_declared_param_count() {
        let mut buf = Vec::new();
        {
            let mut ser = IoSerializer(&mut buf);
            ser.write_i32(1).unwrap();
            ser.write_utf("m").unwrap();
            ser.write_utf("").unwrap();
            ser.write_i32(i32::MAX).unwrap();
        }
        let mut par = IoParser(&buf[..]);
        // The frame is truncated after the declared count, so decoding the
        // first (nonexistent) parameter fails instead of allocating a
        // `Vec` sized for over two billion entries up front.
        assert!(Invoke::decode(&mut par).is_err());
    }
}
