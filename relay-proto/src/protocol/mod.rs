//! Binary wire protocol: primitive encoding, the tagged-object envelope,
//! and the concrete message types built on top of them.

pub mod io;
pub mod messages;
pub mod object;

pub use io::{IoParser, IoSerializer, Parser, Serializer};
pub use messages::*;
pub use object::{read_tagged_object, write_tagged_object, Array, Decode, Encode, MessageType, TaggedObject};
