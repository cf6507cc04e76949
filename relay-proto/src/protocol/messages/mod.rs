//! The concrete message types making up the registry/relay protocol.

pub mod device;
pub mod invoke;
pub mod packet;
pub mod parameter;
pub mod ping;

pub use device::{Device, DeviceAddress, DeviceType, FlashDevice};
pub use invoke::{Invoke, RegistryInfo};
pub use packet::{Packet, PacketType};
pub use parameter::Parameter;
pub use ping::{ByteChunk, Ping};
