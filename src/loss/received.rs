//! Received packet history
//!
//! Records which packet numbers arrived as a bounded list of ranges, from
//! which ACK frames are built.
//!
//! 已接收包历史：以有界的范围列表记录到达的包号，ACK帧由此构建。

use crate::config::ReliabilityConfig;
use crate::types::{AckRange, PacketNumber};
use std::collections::VecDeque;
use tracing::trace;

/// Ranges of received packet numbers.
///
/// Ranges are kept ascending, disjoint and non-adjacent: touching ranges are
/// merged on insert. Once more than `max_ranges` ranges exist, the oldest one
/// is dropped; packets more than `max_tracked_packets` below the largest
/// received are forgotten. Neither bound ever acknowledges a packet that did
/// not arrive.
///
/// 已接收包号的范围。范围保持升序、不相交且不相邻：相邻范围在插入时合并。
/// 超过 `max_ranges` 个范围时丢弃最旧的；比最大已接收包号低
/// `max_tracked_packets` 以上的包会被遗忘。两种边界都不会确认未到达的包。
#[derive(Debug)]
pub struct ReceivedPacketHistory {
    ranges: VecDeque<AckRange>,
    /// Packets below this are no longer tracked.
    lowest_tracked: PacketNumber,
    max_ranges: usize,
    max_tracked_packets: u64,
}

impl ReceivedPacketHistory {
    pub fn new(config: &ReliabilityConfig) -> Self {
        Self {
            ranges: VecDeque::new(),
            lowest_tracked: 0,
            max_ranges: config.max_tracked_received_ack_ranges,
            max_tracked_packets: config.max_tracked_received_packets,
        }
    }

    /// Records a received packet. Returns `false` for duplicates and for
    /// packets too old to be tracked.
    ///
    /// 记录一个收到的包。对重复包和太旧而无法跟踪的包返回 `false`。
    pub fn on_packet_received(&mut self, packet_number: PacketNumber) -> bool {
        if packet_number < self.lowest_tracked {
            trace!(packet_number, lowest = self.lowest_tracked, "Packet below tracked window");
            return false;
        }

        // First range whose largest is not below the packet number.
        let idx = self.ranges.partition_point(|r| r.largest < packet_number);
        if self
            .ranges
            .get(idx)
            .is_some_and(|r| r.smallest <= packet_number)
        {
            return false;
        }

        let joins_previous =
            idx > 0 && self.ranges[idx - 1].largest.checked_add(1) == Some(packet_number);
        let joins_next = self
            .ranges
            .get(idx)
            .is_some_and(|r| packet_number.checked_add(1) == Some(r.smallest));

        match (joins_previous, joins_next) {
            (true, true) => {
                let next_largest = self.ranges[idx].largest;
                self.ranges[idx - 1].largest = next_largest;
                self.ranges.remove(idx);
            }
            (true, false) => self.ranges[idx - 1].largest = packet_number,
            (false, true) => self.ranges[idx].smallest = packet_number,
            (false, false) => self.ranges.insert(idx, AckRange::single(packet_number)),
        }

        self.enforce_bounds();
        true
    }

    fn enforce_bounds(&mut self) {
        if let Some(largest) = self.largest() {
            let floor = largest.saturating_sub(self.max_tracked_packets);
            if floor > self.lowest_tracked {
                self.ignore_below(floor);
            }
        }
        while self.ranges.len() > self.max_ranges {
            if let Some(oldest) = self.ranges.pop_front() {
                self.lowest_tracked = oldest.largest.saturating_add(1);
                trace!(
                    smallest = oldest.smallest,
                    largest = oldest.largest,
                    "Dropped oldest ACK range"
                );
            }
        }
    }

    /// Stops tracking everything below `packet_number`, e.g. once the peer
    /// signals it will not retransmit those packets.
    ///
    /// 停止跟踪低于 `packet_number` 的所有包，例如对端表示不会再重传这些包时。
    pub fn ignore_below(&mut self, packet_number: PacketNumber) {
        if packet_number <= self.lowest_tracked {
            return;
        }
        self.lowest_tracked = packet_number;
        while let Some(front) = self.ranges.front_mut() {
            if front.largest < packet_number {
                self.ranges.pop_front();
            } else {
                front.smallest = front.smallest.max(packet_number);
                break;
            }
        }
    }

    /// The ranges to put into an ACK frame, largest first.
    ///
    /// 放入ACK帧的范围，最大的在前。
    pub fn ack_ranges(&self) -> Vec<AckRange> {
        self.ranges.iter().rev().copied().collect()
    }

    pub fn largest(&self) -> Option<PacketNumber> {
        self.ranges.back().map(|r| r.largest)
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn lowest_tracked(&self) -> PacketNumber {
        self.lowest_tracked
    }
}
