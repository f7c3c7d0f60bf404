//! Protocol module

mod close;
pub mod compression;
pub mod config;
pub mod frame;
pub(crate) mod lock;
pub mod message;
pub mod state;
pub mod websocket;
