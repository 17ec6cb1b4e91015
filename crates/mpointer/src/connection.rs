// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// connection.rs:

//! Process-wide memory service connection shared by every [`MPointer`].
//!
//! [`MPointer`]: crate::pointer::MPointer

use crate::client::{ClientError, MemoryClient};
use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};
use tracing::info;

static CONNECTION: Lazy<RwLock<Option<MemoryClient>>> = Lazy::new(|| RwLock::new(None));

/// Connects to the server at `address` and installs the connection,
/// replacing any previous one.
pub fn init(address: &str) -> Result<(), ClientError> {
    let client = MemoryClient::connect(address)?;
    init_with(client);
    info!(address, "memory service connection initialized");
    Ok(())
}

/// Installs an already-built client.
pub fn init_with(client: MemoryClient) {
    *CONNECTION.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
}

/// Drops the connection. Returns whether one was installed.
pub fn shutdown() -> bool {
    CONNECTION
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .is_some()
}

pub fn is_initialized() -> bool {
    CONNECTION
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

pub fn current() -> Result<MemoryClient, ClientError> {
    CONNECTION
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(ClientError::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::dump::NoDumps;
    use crate::service::MemoryService;
    use serial_test::serial;
    use std::sync::Arc;

    #[test]
    #[serial]
    fn test_lifecycle() {
        shutdown();
        assert!(!is_initialized());
        assert!(matches!(current(), Err(ClientError::NotInitialized)));

        let service = MemoryService::new(Arena::new(64), Arc::new(NoDumps));
        init_with(MemoryClient::new(Arc::new(service)));
        assert!(is_initialized());
        assert!(current().is_ok());

        assert!(shutdown());
        assert!(!shutdown());
        assert!(matches!(current(), Err(ClientError::NotInitialized)));
    }
}
