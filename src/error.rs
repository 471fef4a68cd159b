//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use std::fmt;
use thiserror::Error;

/// Which bound a `LimitExceeded` error refers to.
///
/// `LimitExceeded` 错误所指的边界。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// The advertised stream limit is already at its absolute maximum.
    /// 通告的流限制已达到绝对上限。
    StreamLimit,
    /// The peer tried to open more streams than currently advertised.
    /// 对端尝试打开的流数量超过了当前通告值。
    OpenStreams,
    /// The sent-packet tracker is full of retransmittable packets.
    /// 已发送包跟踪器已被可重传包占满。
    TrackedSentPackets,
    /// Too many undecryptable packets are queued.
    /// 排队的不可解密包过多。
    UndecryptablePackets,
    /// The connection's queue of unprocessed packets is full.
    /// 连接的未处理包队列已满。
    UnprocessedPackets,
    /// Too many gaps in a stream's reassembly state.
    /// 流重组状态中的空洞过多。
    FrameSorterGaps,
    /// A crypto message carries too many parameters.
    /// 加密消息携带的参数过多。
    CryptoParams,
    /// A crypto message parameter is too long.
    /// 加密消息的参数过长。
    CryptoParameterLength,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitKind::StreamLimit => "stream limit",
            LimitKind::OpenStreams => "open streams",
            LimitKind::TrackedSentPackets => "tracked sent packets",
            LimitKind::UndecryptablePackets => "undecryptable packets",
            LimitKind::UnprocessedPackets => "unprocessed packets",
            LimitKind::FrameSorterGaps => "stream frame sorter gaps",
            LimitKind::CryptoParams => "crypto message parameters",
            LimitKind::CryptoParameterLength => "crypto parameter length",
        };
        f.write_str(name)
    }
}

/// The primary error type for the governance library.
/// 治理库的主要错误类型。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Data arrived beyond the advertised flow-control window.
    /// 数据超出了已通告的流量控制窗口。
    #[error("flow control violation: {consumed} + {amount} exceeds window {window}")]
    FlowControlViolation {
        consumed: u64,
        amount: u64,
        window: u64,
    },

    /// A bounded resource is exhausted. The offending request is rejected,
    /// the connection survives.
    /// 有界资源已耗尽。拒绝该请求，连接继续存活。
    #[error("limit exceeded: {0}")]
    LimitExceeded(LimitKind),

    /// The crypto handshake did not complete in time.
    /// 加密握手未能按时完成。
    #[error("crypto handshake did not complete in time")]
    HandshakeTimeout,

    /// The connection was silent for longer than its idle timeout.
    /// 连接静默时间超过了空闲超时。
    #[error("connection timed out due to inactivity")]
    IdleTimeout,

    /// A stream id lies too far above the highest stream opened so far.
    /// 流ID距离已打开的最高流ID过远。
    #[error("stream id {id} is inadmissible (highest opened {highest_opened})")]
    StreamIdInadmissible { id: u32, highest_opened: u32 },

    /// Data or a close arrived for a stream that is not open.
    /// 收到了针对未打开流的数据或关闭。
    #[error("stream {id} is not open")]
    UnknownStream { id: u32 },

    /// A peer-advertised value violates a hard protocol maximum.
    /// 对端通告的值违反了协议硬上限。
    #[error("negotiation of {parameter} failed: {value} exceeds maximum {max}")]
    NegotiationFailed {
        parameter: &'static str,
        value: u64,
        max: u64,
    },

    /// The peer acknowledged a packet number that was never sent on purpose.
    /// 对端确认了一个被刻意跳过的包号。
    #[error("optimistic ACK detected for skipped packet {packet_number}")]
    OptimisticAck { packet_number: u64 },

    /// The peer acknowledged a packet that was never sent.
    /// 对端确认了一个从未发送的包。
    #[error("ACK for unsent packet {largest_acked} (largest sent {largest_sent:?})")]
    InvalidAck {
        largest_acked: u64,
        largest_sent: Option<u64>,
    },

    /// A substituted configuration is internally inconsistent.
    /// 替换的配置内部不一致。
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The connection has been closed.
    /// 连接已关闭。
    #[error("Connection is closed or closing")]
    ConnectionClosed,

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("Internal channel is broken")]
    ChannelClosed,
}

impl Error {
    /// Whether this error must tear the connection down.
    ///
    /// Non-fatal errors reject a single operation and leave the connection alive.
    ///
    /// 此错误是否必须拆除连接。非致命错误只拒绝单个操作，连接保持存活。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FlowControlViolation { .. }
                | Error::HandshakeTimeout
                | Error::IdleTimeout
                | Error::NegotiationFailed { .. }
                | Error::OptimisticAck { .. }
                | Error::InvalidAck { .. }
        )
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::HandshakeTimeout | Error::IdleTimeout => ErrorKind::TimedOut.into(),
            Error::ConnectionClosed => ErrorKind::ConnectionAborted.into(),
            Error::ChannelClosed => ErrorKind::BrokenPipe.into(),
            Error::InvalidConfig(_)
            | Error::LimitExceeded(_)
            | Error::StreamIdInadmissible { .. }
            | Error::UnknownStream { .. } => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
            Error::FlowControlViolation { .. }
            | Error::NegotiationFailed { .. }
            | Error::OptimisticAck { .. }
            | Error::InvalidAck { .. } => std::io::Error::new(ErrorKind::InvalidData, err),
        }
    }
}
