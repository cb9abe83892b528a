//! Peer-to-peer gossip and client RPC
//!
//! Nodes exchange JSON-framed messages over TCP: version announcements,
//! block and transaction gossip, and request/response RPC for clients.

pub mod node;
pub mod server;

pub use node::{Node, Nodes};
pub use server::{
    broadcast_block, broadcast_tx, request, send_block, send_tx, send_version, Package, Response,
    Server,
};

use once_cell::sync::Lazy;

/// Global peer registry
pub static GLOBAL_NODES: Lazy<Nodes> = Lazy::new(Nodes::new);
