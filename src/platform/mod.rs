pub mod traits;

#[cfg(target_os = "linux")]
pub mod linux;

pub use traits::{NetworkConfigurator, PacketChannel};

#[cfg(target_os = "linux")]
pub use linux::{LinuxNetworkConfigurator, TunChannel};
