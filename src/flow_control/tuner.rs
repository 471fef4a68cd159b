//! Defines the pluggable auto-tuning heuristic.
//! 定义了可插拔的自动调整启发式接口。

use super::window::FlowControlWindow;
use crate::types::ByteCount;
use std::fmt::Debug;
use tokio::time::{Duration, Instant};

/// Decides whether the peer is limited by a receive window.
///
/// Implementations only propose a new size. The window itself keeps the result
/// within `[current, max]`.
///
/// 判断对端是否受接收窗口限制。实现只提出新的大小，窗口本身会将结果限制在 `[current, max]` 内。
pub trait AutoTuner: Debug + Send + Sync + 'static {
    /// Returns the proposed window, or `None` if no growth is warranted.
    ///
    /// 返回建议的窗口大小；如果不需要增长则返回 `None`。
    fn proposed_window(
        &self,
        window: &FlowControlWindow,
        rtt: Duration,
        now: Instant,
    ) -> Option<ByteCount>;
}

/// Doubles the window when the previous update was less than two round trips
/// ago, i.e. the peer burned through half a window faster than the path can
/// refill it.
///
/// 当上一次窗口更新距今不足两个往返时间时将窗口翻倍。
#[derive(Debug, Default, Clone, Copy)]
pub struct RttAutoTuner;

impl AutoTuner for RttAutoTuner {
    fn proposed_window(
        &self,
        window: &FlowControlWindow,
        rtt: Duration,
        now: Instant,
    ) -> Option<ByteCount> {
        let last_update = window.last_update()?;
        if rtt.is_zero() {
            return None;
        }
        if now.saturating_duration_since(last_update) < rtt * 2 {
            Some(window.current().saturating_mul(2))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_proposal_without_previous_update() {
        let window = FlowControlWindow::new(100, 1000);
        assert_eq!(
            RttAutoTuner.proposed_window(&window, Duration::from_millis(50), Instant::now()),
            None
        );
    }

    #[test]
    fn test_proposes_doubling_when_fast() {
        let start = Instant::now();
        let mut window = FlowControlWindow::new(100, 1000);
        window.take_window_update(start);
        let rtt = Duration::from_millis(50);

        let fast = start + Duration::from_millis(99);
        assert_eq!(RttAutoTuner.proposed_window(&window, rtt, fast), Some(200));

        let slow = start + Duration::from_millis(100);
        assert_eq!(RttAutoTuner.proposed_window(&window, rtt, slow), None);
    }

    #[test]
    fn test_zero_rtt_never_tunes() {
        let start = Instant::now();
        let mut window = FlowControlWindow::new(100, 1000);
        window.take_window_update(start);
        assert_eq!(
            RttAutoTuner.proposed_window(&window, Duration::ZERO, start),
            None
        );
    }
}
