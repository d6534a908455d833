use std::path::{Path, PathBuf};

use tracing::warn;

use super::parser::parse_config_file;
use super::types::TunnelConfig;

/// Source of the saved tunnel configuration.
///
/// Returns `None` when no valid configuration can be produced; the
/// caller treats that as a fatal start condition.
pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Option<TunnelConfig>;
}

/// Loads the configuration from a wg-quick style file, with optional
/// command line overrides applied on top.
pub struct FileConfigStore {
    path: PathBuf,
    interface_override: Option<String>,
    port_override: Option<u16>,
}

impl FileConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            interface_override: None,
            port_override: None,
        }
    }

    pub fn with_interface_name(mut self, name: Option<String>) -> Self {
        self.interface_override = name;
        self
    }

    pub fn with_listen_port(mut self, port: Option<u16>) -> Self {
        self.port_override = port;
        self
    }
}

impl ConfigProvider for FileConfigStore {
    fn load(&self) -> Option<TunnelConfig> {
        let mut config = match parse_config_file(&self.path) {
            Ok(config) => config,
            Err(e) => {
                warn!("saved configuration did not validate: {}", e);
                return None;
            }
        };
        if let Some(name) = &self.interface_override {
            config.interface.name = Some(name.clone());
        }
        if let Some(port) = self.port_override {
            config.interface.listen_port = Some(port);
        }
        Some(config)
    }
}
