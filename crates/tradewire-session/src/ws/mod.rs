/*
[INPUT]:  Endpoint configuration and serialized frames
[OUTPUT]: Typed wire frames and a duplex WebSocket transport
[POS]:    WebSocket layer - wire format and socket ownership
[UPDATE]: When adding message types or changing connection logic
*/

pub mod frame;
pub mod publish;
pub mod transport;

pub use frame::{Frame, MessageType};
pub use publish::PublishOptions;
pub use transport::{Endpoint, FrameSink, TransportEvent, WebSocketTransport};
