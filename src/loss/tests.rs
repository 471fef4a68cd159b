//! 丢包与重传策略的全面测试
//! Comprehensive tests for the loss and retransmission policy

use super::received::ReceivedPacketHistory;
use super::sent::SentPacketTracker;
use super::skip::{PacketNumberGenerator, SkipSchedule, SkippedPackets};
use crate::config::ReliabilityConfig;
use crate::error::{Error, LimitKind};
use crate::types::AckRange;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::{Duration, Instant};

mod sent_tracker_tests {
    use super::*;

    fn create_test_tracker() -> SentPacketTracker {
        SentPacketTracker::new(&ReliabilityConfig::default())
    }

    fn no_skips() -> SkippedPackets {
        SkippedPackets::new(10)
    }

    #[test]
    fn test_ack_removes_packets_and_samples_rtt() {
        let mut tracker = create_test_tracker();
        let start = Instant::now();
        for pn in 1..=3 {
            tracker.on_packet_sent(pn, start, true).unwrap();
        }

        let later = start + Duration::from_millis(40);
        let outcome = tracker
            .on_ack_received(&[AckRange::new(1, 3)], later, &no_skips())
            .unwrap();
        assert_eq!(outcome.newly_acked, vec![1, 2, 3]);
        assert_eq!(outcome.rtt_sample, Some(Duration::from_millis(40)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_retransmission_triggers_exactly_after_threshold() {
        let mut tracker = create_test_tracker();
        let now = Instant::now();
        for pn in 1..=10 {
            tracker.on_packet_sent(pn, now, true).unwrap();
        }

        // Packet 1 is missing from every ACK; each ACK advances the largest acked.
        for (round, largest) in (2..=5).enumerate() {
            let outcome = tracker
                .on_ack_received(&[AckRange::new(2, largest)], now, &no_skips())
                .unwrap();
            let nacks = round as u32 + 1;
            assert_eq!(tracker.get(1).unwrap().nack_count, nacks);
            if nacks <= 3 {
                assert!(outcome.to_retransmit.is_empty(), "round {round}");
                assert!(!tracker.should_retransmit(1));
            } else {
                assert_eq!(outcome.to_retransmit, vec![1]);
                assert!(tracker.should_retransmit(1));
            }
        }

        // The trigger is reported once, on the transition.
        let outcome = tracker
            .on_ack_received(&[AckRange::new(2, 6)], now, &no_skips())
            .unwrap();
        assert!(outcome.to_retransmit.is_empty());
        assert!(tracker.should_retransmit(1));

        let state = tracker.take_for_retransmission(1).unwrap();
        assert!(state.retransmittable);
        assert!(!tracker.should_retransmit(1));
    }

    #[test]
    fn test_stale_ack_does_not_nack() {
        let mut tracker = create_test_tracker();
        let now = Instant::now();
        for pn in 1..=5 {
            tracker.on_packet_sent(pn, now, true).unwrap();
        }
        tracker
            .on_ack_received(&[AckRange::new(3, 5)], now, &no_skips())
            .unwrap();
        assert_eq!(tracker.get(1).unwrap().nack_count, 1);

        // A reordered ACK with a smaller largest acked.
        let outcome = tracker
            .on_ack_received(&[AckRange::single(2)], now, &no_skips())
            .unwrap();
        assert_eq!(outcome.newly_acked, vec![2]);
        assert_eq!(tracker.get(1).unwrap().nack_count, 1);
    }

    #[test]
    fn test_non_retransmittable_packets_are_dropped_as_lost() {
        let mut tracker = create_test_tracker();
        let now = Instant::now();
        tracker.on_packet_sent(1, now, false).unwrap();
        for pn in 2..=6 {
            tracker.on_packet_sent(pn, now, true).unwrap();
        }
        let mut lost = Vec::new();
        for largest in 2..=5 {
            let outcome = tracker
                .on_ack_received(&[AckRange::new(2, largest)], now, &no_skips())
                .unwrap();
            lost.extend(outcome.lost);
            assert!(outcome.to_retransmit.is_empty());
        }
        assert_eq!(lost, vec![1]);
        assert!(tracker.get(1).is_none());
    }

    #[test]
    fn test_ack_for_unsent_packet_is_rejected() {
        let mut tracker = create_test_tracker();
        let now = Instant::now();
        tracker.on_packet_sent(1, now, true).unwrap();
        let err = tracker
            .on_ack_received(&[AckRange::new(1, 2)], now, &no_skips())
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidAck {
                largest_acked: 2,
                largest_sent: Some(1)
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_inverted_range_is_rejected_without_side_effects() {
        let mut tracker = create_test_tracker();
        let now = Instant::now();
        for pn in 1..=10 {
            tracker.on_packet_sent(pn, now, true).unwrap();
        }
        let inverted = AckRange {
            smallest: 5,
            largest: 3,
        };
        let err = tracker
            .on_ack_received(&[AckRange::single(8), inverted], now, &no_skips())
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidAck {
                largest_acked: 3,
                largest_sent: Some(10)
            }
        );
        assert!(err.is_fatal());
        // Nothing was acknowledged or NACKed.
        assert_eq!(tracker.len(), 10);
        assert_eq!(tracker.largest_acked(), None);
        assert_eq!(tracker.get(1).map(|s| s.nack_count), Some(0));
    }

    #[test]
    fn test_ack_for_skipped_packet_is_optimistic() {
        let mut tracker = create_test_tracker();
        let now = Instant::now();
        let mut skipped = SkippedPackets::new(10);
        tracker.on_packet_sent(1, now, true).unwrap();
        skipped.push(2);
        tracker.on_packet_sent(3, now, true).unwrap();

        assert_eq!(
            tracker.on_ack_received(&[AckRange::new(1, 3)], now, &skipped),
            Err(Error::OptimisticAck { packet_number: 2 })
        );
        // Honest ACKs around the gap are fine.
        let outcome = tracker
            .on_ack_received(&[AckRange::single(3), AckRange::single(1)], now, &skipped)
            .unwrap();
        assert_eq!(outcome.newly_acked, vec![1, 3]);
    }

    #[test]
    fn test_eviction_prefers_non_retransmittable() {
        let config = ReliabilityConfig {
            max_tracked_sent_packets: 3,
            ..Default::default()
        };
        let mut tracker = SentPacketTracker::new(&config);
        let now = Instant::now();

        tracker.on_packet_sent(1, now, true).unwrap();
        tracker.on_packet_sent(2, now, false).unwrap();
        tracker.on_packet_sent(3, now, true).unwrap();
        assert_eq!(tracker.on_packet_sent(4, now, true), Ok(Some(2)));
        assert_eq!(tracker.len(), 3);

        assert_eq!(
            tracker.on_packet_sent(5, now, true),
            Err(Error::LimitExceeded(LimitKind::TrackedSentPackets))
        );
        assert_eq!(tracker.retransmittable_in_flight(), 3);
        assert_eq!(tracker.largest_sent(), Some(4));
    }
}

mod skip_tests {
    use super::*;

    fn test_config(average: u64, min_gap: u64) -> ReliabilityConfig {
        ReliabilityConfig {
            skip_packet_average_period: average,
            skip_packet_min_gap: min_gap,
            max_tracked_skipped_packets: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_seeded_schedule_is_deterministic() {
        let config = ReliabilityConfig::default();
        let mut a = SkipSchedule::new(&config, StdRng::seed_from_u64(7), 0);
        let mut b = SkipSchedule::new(&config, StdRng::seed_from_u64(7), 0);
        assert_eq!(a.peek(), b.peek());
        for _ in 0..100 {
            assert_eq!(a.next_skip(), b.next_skip());
        }
    }

    #[test]
    fn test_skip_points_respect_min_gap_and_average() {
        let config = test_config(50, 10);
        let mut schedule = SkipSchedule::new(&config, StdRng::seed_from_u64(42), 0);
        let first = schedule.peek();
        assert!(first >= 10);
        let mut previous = first;
        let rounds = 10_000u64;
        for _ in 0..rounds {
            let next = schedule.next_skip();
            let gap = next - previous;
            assert!((10..=90).contains(&gap), "gap {gap}");
            previous = next;
        }
        let mean = (previous - first) as f64 / rounds as f64;
        assert!((45.0..=55.0).contains(&mean), "mean {mean}");
    }

    #[test]
    fn test_skipped_list_is_bounded_fifo() {
        let mut skipped = SkippedPackets::new(3);
        for pn in [10, 20, 30, 40] {
            skipped.push(pn);
        }
        assert_eq!(skipped.len(), 3);
        assert!(!skipped.contains(10));
        assert_eq!(skipped.iter().collect::<Vec<_>>(), vec![20, 30, 40]);
        assert_eq!(skipped.first_in(&AckRange::new(25, 45)), Some(30));
    }

    #[test]
    fn test_generator_never_hands_out_skipped_numbers() {
        let config = test_config(5, 1);
        let mut generator = PacketNumberGenerator::new(&config, StdRng::seed_from_u64(3));
        let mut handed_out = Vec::new();
        for _ in 0..1_000 {
            handed_out.push(generator.pop());
        }

        assert!(handed_out.windows(2).all(|w| w[0] < w[1]));
        assert!(!generator.skipped().is_empty());
        assert!(generator.skipped().len() <= 10);
        for pn in generator.skipped().iter() {
            assert!(!handed_out.contains(&pn));
        }
        assert!(generator.peek() > handed_out[handed_out.len() - 1]);
    }
}

mod received_history_tests {
    use super::*;

    fn create_test_history(max_ranges: usize, max_packets: u64) -> ReceivedPacketHistory {
        let config = ReliabilityConfig {
            max_tracked_received_ack_ranges: max_ranges,
            max_tracked_received_packets: max_packets,
            ..Default::default()
        };
        ReceivedPacketHistory::new(&config)
    }

    #[test]
    fn test_largest_packet_number_does_not_overflow() {
        let mut history = create_test_history(1, 1000);
        assert!(history.on_packet_received(u64::MAX));
        assert!(history.on_packet_received(u64::MAX - 1));
        assert!(!history.on_packet_received(u64::MAX));
        assert_eq!(history.ack_ranges(), vec![AckRange::new(u64::MAX - 1, u64::MAX)]);

        // The new lower range is the oldest and is evicted at once.
        assert!(history.on_packet_received(u64::MAX - 3));
        assert_eq!(history.range_count(), 1);
        assert_eq!(history.lowest_tracked(), u64::MAX - 2);
        assert_eq!(history.ack_ranges(), vec![AckRange::new(u64::MAX - 1, u64::MAX)]);
    }

    #[test]
    fn test_adjacent_packets_merge() {
        let mut history = create_test_history(100, 1000);
        for pn in [1, 2, 3, 5, 7, 6] {
            assert!(history.on_packet_received(pn));
        }
        assert_eq!(
            history.ack_ranges(),
            vec![AckRange::new(5, 7), AckRange::new(1, 3)]
        );

        // Filling the hole joins both sides.
        assert!(history.on_packet_received(4));
        assert_eq!(history.ack_ranges(), vec![AckRange::new(1, 7)]);
    }

    #[test]
    fn test_duplicates_are_reported() {
        let mut history = create_test_history(100, 1000);
        assert!(history.on_packet_received(10));
        assert!(!history.on_packet_received(10));
        assert!(history.on_packet_received(8));
        assert!(!history.on_packet_received(8));
        assert_eq!(history.largest(), Some(10));
    }

    #[test]
    fn test_range_overflow_drops_oldest() {
        let mut history = create_test_history(3, 1000);
        for pn in [1, 3, 5, 7] {
            history.on_packet_received(pn);
        }
        assert_eq!(history.range_count(), 3);
        assert_eq!(
            history.ack_ranges(),
            vec![AckRange::single(7), AckRange::single(5), AckRange::single(3)]
        );
        // The evicted packet is no longer accepted.
        assert_eq!(history.lowest_tracked(), 2);
        assert!(!history.on_packet_received(1));
    }

    #[test]
    fn test_old_packets_fall_out_of_tracking() {
        let mut history = create_test_history(100, 10);
        history.on_packet_received(1);
        history.on_packet_received(5);
        history.on_packet_received(20);
        assert_eq!(history.lowest_tracked(), 10);
        assert_eq!(history.ack_ranges(), vec![AckRange::single(20)]);
        assert!(!history.on_packet_received(9));
        assert!(history.on_packet_received(11));
    }

    #[test]
    fn test_ignore_below_trims_ranges() {
        let mut history = create_test_history(100, 1000);
        for pn in 1..=10 {
            history.on_packet_received(pn);
        }
        history.ignore_below(4);
        assert_eq!(history.ack_ranges(), vec![AckRange::new(4, 10)]);
        // Moving the floor backwards is a no-op.
        history.ignore_below(2);
        assert_eq!(history.lowest_tracked(), 4);
    }
}
