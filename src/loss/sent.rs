//! Sent packet tracker
//!
//! Keeps per-packet retransmission state for packets in flight and turns
//! incoming ACK ranges into NACK counts and retransmission decisions.
//!
//! 已发送包跟踪器：为在途包保存重传状态，并将收到的ACK范围转换为NACK计数和重传决策。

use super::skip::SkippedPackets;
use crate::config::ReliabilityConfig;
use crate::error::{Error, LimitKind, Result};
use crate::types::{AckRange, PacketNumber};
use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Retransmission bookkeeping for one sent packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmissionState {
    pub sent_time: Instant,
    pub nack_count: u32,
    pub retransmittable: bool,
}

/// Represents the result of processing an ACK
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AckOutcome {
    /// Packet numbers newly acknowledged by this ACK, ascending.
    pub newly_acked: Vec<PacketNumber>,
    /// Retransmittable packets whose NACK count just crossed the threshold.
    pub to_retransmit: Vec<PacketNumber>,
    /// Non-retransmittable packets that crossed the threshold and were dropped.
    pub lost: Vec<PacketNumber>,
    /// RTT sample taken from the largest acknowledged packet, if newly acked.
    pub rtt_sample: Option<Duration>,
}

/// Tracks packets in flight, bounded by `max_tracked_sent_packets`.
#[derive(Debug)]
pub struct SentPacketTracker {
    packets: BTreeMap<PacketNumber, RetransmissionState>,
    largest_sent: Option<PacketNumber>,
    largest_acked: Option<PacketNumber>,
    retransmission_threshold: u32,
    max_tracked: usize,
}

impl SentPacketTracker {
    pub fn new(config: &ReliabilityConfig) -> Self {
        Self {
            packets: BTreeMap::new(),
            largest_sent: None,
            largest_acked: None,
            retransmission_threshold: config.retransmission_threshold,
            max_tracked: config.max_tracked_sent_packets,
        }
    }

    /// Records a sent packet.
    ///
    /// When the tracker is full the oldest non-retransmittable packet is
    /// evicted and returned. If every tracked packet still needs
    /// retransmission bookkeeping, the send is refused instead.
    ///
    /// 记录一个已发送的包。跟踪器已满时，驱逐并返回最旧的不可重传包；
    /// 如果所有被跟踪的包仍需重传记账，则拒绝此次发送。
    pub fn on_packet_sent(
        &mut self,
        packet_number: PacketNumber,
        now: Instant,
        retransmittable: bool,
    ) -> Result<Option<PacketNumber>> {
        let mut evicted = None;
        if self.packets.len() >= self.max_tracked {
            let oldest = self
                .packets
                .iter()
                .find(|(_, state)| !state.retransmittable)
                .map(|(pn, _)| *pn);
            match oldest {
                Some(pn) => {
                    self.packets.remove(&pn);
                    trace!(evicted = pn, "Evicted oldest non-retransmittable packet");
                    evicted = Some(pn);
                }
                None => {
                    debug!(
                        tracked = self.packets.len(),
                        "Too many outstanding retransmittable packets"
                    );
                    return Err(Error::LimitExceeded(LimitKind::TrackedSentPackets));
                }
            }
        }

        self.packets.insert(
            packet_number,
            RetransmissionState {
                sent_time: now,
                nack_count: 0,
                retransmittable,
            },
        );
        if self.largest_sent.is_none_or(|largest| packet_number > largest) {
            self.largest_sent = Some(packet_number);
        }
        Ok(evicted)
    }

    /// Processes the ranges of an incoming ACK.
    ///
    /// Acknowledged packets are removed. If the ACK advances the largest
    /// acknowledged packet, every unacked packet below it is NACKed once.
    /// ACKs for skipped packet numbers reveal an optimistic ACK attack.
    ///
    /// 处理收到的ACK范围。被确认的包被移除。若ACK推进了最大确认包号，
    /// 低于它的每个未确认包被NACK一次。确认被跳过的包号意味着乐观ACK攻击。
    pub fn on_ack_received(
        &mut self,
        ranges: &[AckRange],
        now: Instant,
        skipped: &SkippedPackets,
    ) -> Result<AckOutcome> {
        let mut outcome = AckOutcome::default();
        if let Some(bad) = ranges.iter().find(|r| !r.is_well_formed()) {
            warn!(smallest = bad.smallest, largest = bad.largest, "Malformed ACK range");
            return Err(Error::InvalidAck {
                largest_acked: bad.largest,
                largest_sent: self.largest_sent,
            });
        }
        let Some(largest) = ranges.iter().map(|r| r.largest).max() else {
            return Ok(outcome);
        };

        if self.largest_sent.is_none_or(|sent| largest > sent) {
            warn!(
                largest_acked = largest,
                largest_sent = ?self.largest_sent,
                "ACK for unsent packet"
            );
            return Err(Error::InvalidAck {
                largest_acked: largest,
                largest_sent: self.largest_sent,
            });
        }
        for range in ranges {
            if let Some(pn) = skipped.first_in(range) {
                warn!(packet_number = pn, "ACK covers a skipped packet number");
                return Err(Error::OptimisticAck { packet_number: pn });
            }
        }

        for range in ranges {
            let acked: Vec<PacketNumber> = self
                .packets
                .range(range.smallest..=range.largest)
                .map(|(pn, _)| *pn)
                .collect();
            for pn in acked {
                if let Some(state) = self.packets.remove(&pn) {
                    if pn == largest {
                        outcome.rtt_sample = Some(now.saturating_duration_since(state.sent_time));
                    }
                    outcome.newly_acked.push(pn);
                }
            }
        }
        outcome.newly_acked.sort_unstable();

        let advances = self.largest_acked.is_none_or(|previous| largest > previous);
        if !advances {
            trace!(largest_acked = largest, "Stale ACK, NACK counts unchanged");
            return Ok(outcome);
        }
        self.largest_acked = Some(largest);

        let trigger = self.retransmission_threshold + 1;
        for (&pn, state) in self.packets.range_mut(..largest) {
            state.nack_count += 1;
            trace!(
                pn,
                nack_count = state.nack_count,
                threshold = self.retransmission_threshold,
                "Packet NACKed"
            );
            if state.nack_count == trigger {
                if state.retransmittable {
                    debug!(pn, "Retransmission triggered by NACKs");
                    outcome.to_retransmit.push(pn);
                } else {
                    outcome.lost.push(pn);
                }
            }
        }
        for pn in &outcome.lost {
            self.packets.remove(pn);
        }
        Ok(outcome)
    }

    /// Whether the packet has been NACKed more often than the threshold.
    pub fn should_retransmit(&self, packet_number: PacketNumber) -> bool {
        self.packets
            .get(&packet_number)
            .is_some_and(|state| state.nack_count > self.retransmission_threshold)
    }

    /// Hands a packet over for retransmission, forgetting it here.
    pub fn take_for_retransmission(
        &mut self,
        packet_number: PacketNumber,
    ) -> Option<RetransmissionState> {
        self.packets.remove(&packet_number)
    }

    pub fn get(&self, packet_number: PacketNumber) -> Option<&RetransmissionState> {
        self.packets.get(&packet_number)
    }

    /// Number of retransmittable packets in flight.
    pub fn retransmittable_in_flight(&self) -> usize {
        self.packets.values().filter(|s| s.retransmittable).count()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn largest_sent(&self) -> Option<PacketNumber> {
        self.largest_sent
    }

    pub fn largest_acked(&self) -> Option<PacketNumber> {
        self.largest_acked
    }

    /// Clears all tracked packets.
    ///
    /// 清除所有被跟踪的包。
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
