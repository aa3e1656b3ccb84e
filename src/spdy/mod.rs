pub mod compression;
pub mod consts;
pub mod framing;
pub mod session;
pub mod stream;

pub use compression::{HeaderCompressor, HeaderDecompressor};
pub use session::SpdySession;
pub use stream::{Stream, StreamPhase};
