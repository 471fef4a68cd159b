//! The loss and retransmission policy.
//!
//! This layer is responsible for sent/received packet bookkeeping under fixed
//! memory bounds, NACK-counting retransmission decisions, and packet-number
//! skipping against optimistic ACK attacks.
//!
//! 丢包与重传策略。
//!
//! 该层负责在固定内存边界下的收发包记账、基于NACK计数的重传决策，
//! 以及用于抵御乐观ACK攻击的包号跳跃。

pub mod received;
pub mod sent;
pub mod skip;

#[cfg(test)]
mod tests;

pub use received::ReceivedPacketHistory;
pub use sent::{AckOutcome, RetransmissionState, SentPacketTracker};
pub use skip::{PacketNumberGenerator, SkipSchedule, SkippedPackets};
