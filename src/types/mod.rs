pub mod error;
pub mod frame;
pub mod header;
pub mod protocol;
pub mod request;
pub mod response;
pub mod target;
pub mod timeouts;

pub use error::*;
pub use frame::*;
pub use header::*;
pub use protocol::*;
pub use request::*;
pub use response::*;
pub use target::*;
pub use timeouts::*;
