//! 连接生命周期与超时管理模块
//! Connection lifecycle and timeout management module
//!
//! 该模块管理连接从等待握手到关闭的阶段，强制执行握手截止时间、空闲超时
//! 以及关闭后连接ID仍被识别的保留期。
//!
//! This module governs a connection's phases from awaiting the handshake to
//! closed, enforcing the handshake deadline, the idle timeout, and the grace
//! period during which a closed connection id stays recognized.

pub mod machine;
pub mod state;


pub use machine::{TimeoutStateMachine, negotiate_idle_timeout};
pub use state::{ConnectionPhase, IdleTimeoutPhase};
