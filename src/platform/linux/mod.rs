pub mod netlink;
pub mod tun;

pub use netlink::LinuxNetworkConfigurator;
pub use tun::TunChannel;
