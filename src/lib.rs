//! A small peer-to-peer file directory system: hosts register the files
//! they share with a central directory server over a reliable UDP
//! transport, query each other's shares, then exchange the files
//! themselves directly over TCP.

pub mod client;
pub mod codec;
pub mod error;
pub mod fileshare;
pub mod host;
pub mod index;
pub mod rdt;
pub mod server;

pub use error::{ClientError, CodecError, FileShareError, RdtError, ServerError};
pub use host::HostId;
