// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// config.rs:

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_MEMSIZE_MB: usize = 100;
pub const DEFAULT_DUMP_FOLDER: &str = "../dumpFolderRegistros";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Startup parameters of a memory server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub memsize_mb: usize,
    pub dump_folder: PathBuf,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            memsize_mb: DEFAULT_MEMSIZE_MB,
            dump_folder: PathBuf::from(DEFAULT_DUMP_FOLDER),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// All interfaces on the configured port.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
