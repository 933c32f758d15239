//! Remote control over TCP.

pub mod protocol;
pub mod server;

pub use protocol::{ClientCommand, ProtocolError, RemoteClient};
pub use server::{NetCells, NetControlServer, ServerControl};
