#![deny(clippy::expect_used, clippy::unwrap_used)]

//! Connection parameter governance for a QUIC-like transport.
//! 类QUIC传输协议的连接参数治理层。
//!
//! Turns the protocol's fixed defaults and bounds into per-connection limits
//! and enforces them for the lifetime of each connection.
//!
//! 将协议固定的默认值和边界转化为每个连接的运行时限制，并在连接的整个生命周期内执行。

pub mod config;
pub mod error;
pub mod types;

pub mod ack;
pub mod cert_cache;
pub mod congestion;
pub mod connection;
pub mod flow_control;
pub mod handshake;
pub mod lifecycle;
pub mod loss;
pub mod stream;

pub use config::Config;
pub use error::{Error, LimitKind, Result};
