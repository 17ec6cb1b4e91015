// Huly™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// lib.rs:

//! Remote reference-counted memory. A server owns one contiguous arena and
//! hands out typed blocks; clients hold [`MPointer`] handles whose lifetime
//! drives the server-side reference counts.

pub mod allocator;
pub mod arena;
pub mod block;
pub mod client;
pub mod codec;
pub mod collector;
pub mod config;
pub mod connection;
pub mod dump;
pub mod heap;
pub mod message;
pub mod pointer;
pub mod server;
pub mod service;

pub use arena::Arena;
pub use block::BlockId;
pub use client::{ClientError, MemoryClient};
pub use codec::{Primitive, TypeTag, Value};
pub use config::ServerConfig;
pub use heap::MemoryError;
pub use pointer::{MPointer, Reference};
pub use server::Server;
pub use service::MemoryService;
