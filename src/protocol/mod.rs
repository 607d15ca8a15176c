//! Wire framing shared by the server, the transports and the client.

mod frame;
mod sink;

pub use frame::{encode, FrameDecoder, FrameReader, SENTINEL};
pub use sink::{spawn_writer, OutputSink};
