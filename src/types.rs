//! 定义了在各组件之间共享的基础量。
//! Defines the basic quantities shared between components.

use std::fmt;
use std::ops::RangeInclusive;

/// A quantity of bytes, used for windows and offsets.
/// 字节数量，用于窗口和偏移量。
pub type ByteCount = u64;

/// A per-direction packet sequence number.
/// 单方向的包序列号。
pub type PacketNumber = u64;

/// Identifies a connection inside a `ConnectionTable`.
/// 在 `ConnectionTable` 中标识一个连接。
pub type ConnectionId = u32;

/// Which end of the connection this process is.
///
/// 本进程处于连接的哪一端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    Client,
    Server,
}

impl Perspective {
    /// The opposite end.
    pub fn opposite(self) -> Self {
        match self {
            Perspective::Client => Perspective::Server,
            Perspective::Server => Perspective::Client,
        }
    }
}

/// A stream identifier. Client-initiated streams are odd, server-initiated
/// streams are even.
///
/// 流标识符。客户端发起的流为奇数，服务端发起的流为偶数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u32);

impl StreamId {
    /// The side that opened this stream.
    /// 打开此流的一端。
    pub fn initiator(self) -> Perspective {
        if self.0 % 2 == 1 {
            Perspective::Client
        } else {
            Perspective::Server
        }
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous, inclusive range of acknowledged packet numbers.
/// 一个连续的、包含两端的已确认包号范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    /// The smallest packet number in the range (inclusive).
    /// 范围内最小的包号（包含）。
    pub smallest: PacketNumber,
    /// The largest packet number in the range (inclusive).
    /// 范围内最大的包号（包含）。
    pub largest: PacketNumber,
}

impl AckRange {
    pub fn new(smallest: PacketNumber, largest: PacketNumber) -> Self {
        debug_assert!(smallest <= largest);
        Self { smallest, largest }
    }

    pub fn single(packet_number: PacketNumber) -> Self {
        Self::new(packet_number, packet_number)
    }

    /// Whether `smallest <= largest`. Ranges decoded from the wire must be
    /// checked before use.
    ///
    /// 是否满足 `smallest <= largest`。从线路解码的范围在使用前必须检查。
    pub fn is_well_formed(&self) -> bool {
        self.smallest <= self.largest
    }

    pub fn contains(&self, packet_number: PacketNumber) -> bool {
        (self.smallest..=self.largest).contains(&packet_number)
    }

    /// Number of packet numbers covered; zero for a malformed range.
    pub fn packet_count(&self) -> u64 {
        if self.is_well_formed() {
            self.largest - self.smallest + 1
        } else {
            0
        }
    }
}

impl From<RangeInclusive<PacketNumber>> for AckRange {
    fn from(range: RangeInclusive<PacketNumber>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}
