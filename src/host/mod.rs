mod traits;
mod tunnel;

pub use traits::{StopReason, TunnelHost};
pub use tunnel::PacketTunnel;
