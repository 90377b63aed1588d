//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server for Ticketline: queue methods plus snapshot
//! subscriptions for live boards.

pub mod error;
pub mod gate;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
