//! Per-connection governance.
//!
//! Each connection owns one `ConnectionGovernor` state block holding its
//! stream limits, flow-control windows, loss and ACK state, and timeouts.
//! The block is driven by a dedicated actor task; collaborators talk to it
//! only through a `GovernorHandle`.
//!
//! 每个连接的治理。每个连接拥有一个 `ConnectionGovernor` 状态块，其中包含流限制、
//! 流量控制窗口、丢包与ACK状态以及超时。状态块由专用的 actor 任务驱动；
//! 协作方只能通过 `GovernorHandle` 与之交互。

pub mod actor;
pub mod command;
pub mod governor;
pub mod queue;
pub mod table;


pub use actor::{GovernorHandle, spawn_governor};
pub use command::{GovernorCommand, GovernorEvent};
pub use governor::{ConnectionGovernor, GovernorSnapshot, PeerParameters};
pub use queue::UndecryptableQueue;
pub use table::ConnectionTable;
