//! HTTP/1 upgrade handshake

pub mod client;
pub mod core;
pub mod headers;
pub mod machine;
pub mod server;

pub use self::core::{derive_accept_key, generate_key};
