pub mod client;
pub mod connection;
pub mod h1;
pub mod logging;
pub mod registry;
pub mod spdy;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::Client;
pub use connection::{Connected, Connector, TransportConnector};
pub use h1::HttpSession;
pub use registry::SessionRegistry;
pub use spdy::SpdySession;
pub use types::*;
