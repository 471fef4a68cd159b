//! Packet-number skipping against optimistic ACK attacks.
//!
//! A sender that leaves an occasional packet number unused can tell when a
//! peer acknowledges packets it never received: no honest peer can ACK a
//! packet number that was never sent.
//!
//! 针对乐观ACK攻击的包号跳跃。偶尔留出未使用包号的发送方可以察觉对端确认了
//! 它从未收到的包：诚实的对端不可能确认一个从未发送过的包号。

use crate::config::ReliabilityConfig;
use crate::types::{AckRange, PacketNumber};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use tracing::trace;

/// Draws the packet numbers at which a gap is inserted.
///
/// Consecutive skip points are `[min_gap, 2 * average - min_gap]` apart,
/// uniformly distributed, so their mean distance is `average`.
///
/// 抽取插入空洞的包号。相邻跳跃点间距在 `[min_gap, 2 * average - min_gap]` 内均匀分布，平均间距为 `average`。
#[derive(Debug)]
pub struct SkipSchedule<R = StdRng> {
    rng: R,
    min_gap: PacketNumber,
    max_gap: PacketNumber,
    next_skip: PacketNumber,
}

impl<R: Rng> SkipSchedule<R> {
    /// Creates a schedule whose first skip point lies after `start`.
    pub fn new(config: &ReliabilityConfig, rng: R, start: PacketNumber) -> Self {
        let min_gap = config.skip_packet_min_gap.max(1);
        let max_gap = config
            .skip_packet_average_period
            .saturating_mul(2)
            .saturating_sub(min_gap)
            .max(min_gap);
        let mut schedule = Self {
            rng,
            min_gap,
            max_gap,
            next_skip: start,
        };
        schedule.next_skip = start.saturating_add(schedule.draw_period());
        schedule
    }

    fn draw_period(&mut self) -> PacketNumber {
        self.rng.random_range(self.min_gap..=self.max_gap)
    }

    /// The upcoming skip point.
    pub fn peek(&self) -> PacketNumber {
        self.next_skip
    }

    /// Advances past the current skip point and returns the next one.
    ///
    /// 越过当前跳跃点并返回下一个跳跃点。
    pub fn next_skip(&mut self) -> PacketNumber {
        let period = self.draw_period();
        self.next_skip = self.next_skip.saturating_add(period);
        self.next_skip
    }
}

impl SkipSchedule<StdRng> {
    /// A schedule seeded from the operating system.
    pub fn from_os_rng(config: &ReliabilityConfig, start: PacketNumber) -> Self {
        Self::new(config, StdRng::from_os_rng(), start)
    }
}

/// The most recently skipped packet numbers, oldest first.
///
/// 最近被跳过的包号，最旧的在前。
#[derive(Debug, Clone)]
pub struct SkippedPackets {
    packets: VecDeque<PacketNumber>,
    max_tracked: usize,
}

impl SkippedPackets {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            packets: VecDeque::with_capacity(max_tracked),
            max_tracked,
        }
    }

    /// Remembers a skipped packet number, forgetting the oldest on overflow.
    pub fn push(&mut self, packet_number: PacketNumber) {
        if self.packets.len() >= self.max_tracked {
            self.packets.pop_front();
        }
        self.packets.push_back(packet_number);
    }

    pub fn contains(&self, packet_number: PacketNumber) -> bool {
        self.packets.contains(&packet_number)
    }

    /// The first remembered skipped packet number inside `range`.
    pub fn first_in(&self, range: &AckRange) -> Option<PacketNumber> {
        self.packets.iter().copied().find(|pn| range.contains(*pn))
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PacketNumber> + '_ {
        self.packets.iter().copied()
    }
}

/// Hands out packet numbers, leaving one unused at every skip point.
///
/// 分配包号，在每个跳跃点留出一个未使用的包号。
#[derive(Debug)]
pub struct PacketNumberGenerator<R = StdRng> {
    next: PacketNumber,
    schedule: SkipSchedule<R>,
    skipped: SkippedPackets,
}

impl<R: Rng> PacketNumberGenerator<R> {
    pub fn new(config: &ReliabilityConfig, rng: R) -> Self {
        let start = 1;
        Self {
            next: start,
            schedule: SkipSchedule::new(config, rng, start),
            skipped: SkippedPackets::new(config.max_tracked_skipped_packets),
        }
    }

    /// The packet number the next call to `pop` returns.
    pub fn peek(&self) -> PacketNumber {
        self.next
    }

    /// Returns the next packet number to use.
    ///
    /// 返回下一个要使用的包号。
    pub fn pop(&mut self) -> PacketNumber {
        let packet_number = self.next;
        self.next += 1;
        while self.next == self.schedule.peek() {
            trace!(skipped = self.next, "Skipping packet number");
            self.skipped.push(self.next);
            self.next += 1;
            self.schedule.next_skip();
        }
        packet_number
    }

    pub fn skipped(&self) -> &SkippedPackets {
        &self.skipped
    }
}
