mod codec;
mod message;

pub use codec::WireMessage;
pub use message::{FaultCode, Request, Response};
