//! Chat Bridge Library
//!
//! A synchronous HTTP chat gateway in front of a single duplex WebSocket
//! connection to a conversational backend, plus that backend's world server.
//! The binaries are `src/main.rs` (gateway) and `src/bin/world_server.rs`.

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod store;
pub mod world;
