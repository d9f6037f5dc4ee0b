pub mod backoff;
pub mod client;
pub mod decoder;
pub mod endpoint;
pub mod machine;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::{StreamClient, StreamConfig};
pub use decoder::{decode_frame, repair_tokens, DecodeError};
pub use endpoint::DeviceEndpoint;
pub use machine::{ConnectionId, LinkCommand, LinkEvent, LinkMachine};
pub use transport::{Connection, Connector, TransportEvent, WsConnector};
