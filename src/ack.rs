//! ACK 调度器
//! ACK scheduler
//!
//! 根据接收包数、可重传包数以及最旧未确认可重传包的等待时长，决定何时必须发送ACK。
//!
//! Decides when an ACK must be sent based on the number of received packets,
//! the number of retransmittable packets, and how long the oldest
//! unacknowledged retransmittable packet has been waiting.

use crate::config::AckConfig;
use tokio::time::Instant;
use tracing::trace;

/// Per-connection ACK scheduling state.
///
/// 每个连接的ACK调度状态。
#[derive(Debug)]
pub struct AckScheduler {
    config: AckConfig,
    /// 自上次发送ACK以来收到的包数
    /// Packets received since the last ACK was sent
    packets_since_ack: u32,
    /// 自上次发送ACK以来收到的可重传包数
    /// Retransmittable packets received since the last ACK was sent
    retransmittable_since_ack: u32,
    /// 最旧的未确认可重传包的到达时间
    /// Arrival time of the oldest unacknowledged retransmittable packet
    oldest_unacked_retransmittable: Option<Instant>,
}

impl AckScheduler {
    pub fn new(config: AckConfig) -> Self {
        Self {
            config,
            packets_since_ack: 0,
            retransmittable_since_ack: 0,
            oldest_unacked_retransmittable: None,
        }
    }

    /// 记录一个收到的包
    /// Records a received packet
    pub fn on_packet_received(&mut self, retransmittable: bool, now: Instant) {
        self.packets_since_ack = self.packets_since_ack.saturating_add(1);
        if retransmittable {
            self.retransmittable_since_ack = self.retransmittable_since_ack.saturating_add(1);
            self.oldest_unacked_retransmittable.get_or_insert(now);
        }
        trace!(
            packets = self.packets_since_ack,
            retransmittable = self.retransmittable_since_ack,
            "ACK scheduler counters updated"
        );
    }

    /// Whether an ACK must be sent now.
    ///
    /// True as soon as any of these holds: enough packets arrived, enough
    /// retransmittable packets arrived, or the oldest unacknowledged
    /// retransmittable packet has waited for the ACK send delay.
    ///
    /// 是否必须立即发送ACK。以下任一条件满足即为真：收到足够多的包、收到足够多的
    /// 可重传包，或最旧的未确认可重传包已等待了ACK发送延迟。
    pub fn should_send_ack_now(&self, now: Instant) -> bool {
        self.packets_since_ack >= self.config.max_packets_received_before_ack
            || self.retransmittable_since_ack >= self.config.retransmittable_packets_before_ack
            || self.ack_deadline().is_some_and(|deadline| now >= deadline)
    }

    /// 延迟条件将触发的时刻，用于设置连接定时器
    /// The instant at which the delay condition fires, used to arm the connection timer
    pub fn ack_deadline(&self) -> Option<Instant> {
        self.oldest_unacked_retransmittable
            .map(|oldest| oldest + self.config.ack_send_delay)
    }

    /// Resets all counters once an ACK has actually been emitted.
    ///
    /// 在ACK实际发出后重置所有计数器。
    pub fn on_ack_sent(&mut self) {
        self.packets_since_ack = 0;
        self.retransmittable_since_ack = 0;
        self.oldest_unacked_retransmittable = None;
    }

    pub fn packets_since_ack(&self) -> u32 {
        self.packets_since_ack
    }

    pub fn retransmittable_since_ack(&self) -> u32 {
        self.retransmittable_since_ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn create_test_scheduler() -> AckScheduler {
        AckScheduler::new(AckConfig::default())
    }

    #[test]
    fn test_fresh_scheduler_is_quiet() {
        let scheduler = create_test_scheduler();
        assert!(!scheduler.should_send_ack_now(Instant::now()));
        assert_eq!(scheduler.ack_deadline(), None);
    }

    #[test]
    fn test_packet_count_triggers_at_limit() {
        let mut scheduler = create_test_scheduler();
        let now = Instant::now();
        for _ in 0..19 {
            scheduler.on_packet_received(false, now);
        }
        assert!(!scheduler.should_send_ack_now(now));
        scheduler.on_packet_received(false, now);
        assert!(scheduler.should_send_ack_now(now));
        // Non-retransmittable packets never arm the delay timer.
        assert_eq!(scheduler.ack_deadline(), None);
    }

    #[test]
    fn test_retransmittable_count_triggers_at_limit() {
        let mut scheduler = create_test_scheduler();
        let now = Instant::now();
        scheduler.on_packet_received(true, now);
        assert!(!scheduler.should_send_ack_now(now));
        scheduler.on_packet_received(true, now);
        assert!(scheduler.should_send_ack_now(now));
    }

    #[test]
    fn test_delay_triggers_after_send_delay() {
        let mut scheduler = create_test_scheduler();
        let start = Instant::now();
        scheduler.on_packet_received(true, start);
        // A later retransmittable packet does not move the deadline.
        scheduler.on_packet_received(false, start + Duration::from_millis(10));

        assert_eq!(
            scheduler.ack_deadline(),
            Some(start + Duration::from_millis(25))
        );
        assert!(!scheduler.should_send_ack_now(start + Duration::from_millis(24)));
        assert!(scheduler.should_send_ack_now(start + Duration::from_millis(25)));
    }

    #[test]
    fn test_ack_sent_resets_everything() {
        let mut scheduler = create_test_scheduler();
        let now = Instant::now();
        for _ in 0..25 {
            scheduler.on_packet_received(true, now);
        }
        assert!(scheduler.should_send_ack_now(now));

        scheduler.on_ack_sent();
        assert_eq!(scheduler.packets_since_ack(), 0);
        assert_eq!(scheduler.retransmittable_since_ack(), 0);
        assert_eq!(scheduler.ack_deadline(), None);
        assert!(!scheduler.should_send_ack_now(now + Duration::from_secs(1)));
    }
}
