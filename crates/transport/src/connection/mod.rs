//! Connection glue: the outbound [`Transport`] abstraction and the inbound
//! [`FramePump`] that feeds decoded frames into a stream.

mod pump;
mod transport;

pub use pump::FramePump;
pub use transport::{BufferTransport, ChannelTransport, Transport};
