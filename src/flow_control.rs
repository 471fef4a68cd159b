//! Flow-control window negotiation and enforcement.
//! 流量控制窗口的协商与执行。
//!
//! Windows exist per stream and per connection. A receiver grants the sender a
//! byte budget (`current`) that auto-tuning may grow up to a hard maximum
//! (`max`); any data beyond the budget is a fatal violation.
//!
//! 窗口按流和按连接存在。接收方授予发送方一个字节预算（`current`），
//! 自动调整可以将其增长到硬上限（`max`）；超出预算的任何数据都是致命违规。

pub mod negotiator;
pub mod tuner;
pub mod window;

#[cfg(test)]
mod tests;

pub use negotiator::{
    FlowControlNegotiator, WindowAdvertisement, WindowScope, WindowUpdate, negotiate_initial,
};
pub use tuner::{AutoTuner, RttAutoTuner};
pub use window::FlowControlWindow;
