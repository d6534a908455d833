pub mod parser;
pub mod settings;
pub mod store;
pub mod types;

pub use parser::{parse_config_file, parse_config_str};
pub use settings::{engine_settings, network_settings, NetworkSettings, DEFAULT_MTU};
pub use store::{ConfigProvider, FileConfigStore};
pub use types::{
    Endpoint, Host, InterfaceAddress, InterfaceConfig, PeerConfig, TunnelConfig,
};
