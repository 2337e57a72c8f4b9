//! Native-messaging transport: the message protocol spoken with the browser
//! extension and the length-prefixed JSON framing it rides on.

pub mod codec;
pub mod message;

pub use codec::{CodecError, Frame, MAX_FRAME_LEN, NativeMessageCodec};
pub use message::Message;
