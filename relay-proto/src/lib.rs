//! Wire codec and message types for the device registry/relay protocol:
//! a length-prefixed, little-endian, tagged-object binary protocol used
//! by game and controller clients to discover and relay through a
//! central registry server.
//!
//! This crate only implements the protocol itself (framing, primitive
//! encoding, message types, and the version handshake); the registry,
//! relay, and session bookkeeping built on top of it live in the
//! `relay-server` binary crate.

pub mod error;
pub mod framing;
pub mod protocol;
pub mod version;

pub use error::{DecodeError, EncodeError};
pub use framing::{decode_frame, encode_frame, FrameExtractor};
pub use protocol::{
    Array, ByteChunk, Decode, Device, DeviceAddress, DeviceType, Encode, FlashDevice, Invoke,
    MessageType, Packet, PacketType, Parameter, Ping, RegistryInfo, TaggedObject,
};
pub use version::{write_handshake, Version8Bit, PROTOCOL_VERSION};
