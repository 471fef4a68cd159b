//! A single flow-control window.
//!
//! 单个流量控制窗口。

use super::tuner::AutoTuner;
use crate::error::{Error, Result};
use crate::types::ByteCount;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

/// A receive window for one stream or for the whole connection.
///
/// Invariant: `consumed <= current <= max`. `consumed` counts bytes received
/// and not yet retired by the application; retiring returns credit to the
/// peer through a window update.
///
/// 一个流或整个连接的接收窗口。
///
/// 不变量：`consumed <= current <= max`。`consumed` 统计已接收但尚未被应用程序
/// 释放的字节；释放后通过窗口更新将额度归还给对端。
#[derive(Debug, Clone)]
pub struct FlowControlWindow {
    current: ByteCount,
    max: ByteCount,
    consumed: ByteCount,
    /// Bytes retired since the last window update was taken.
    /// 自上次窗口更新以来释放的字节。
    pending_credit: ByteCount,
    last_update: Option<Instant>,
}

impl FlowControlWindow {
    /// Creates a window of `current` bytes that may grow up to `max`.
    pub fn new(current: ByteCount, max: ByteCount) -> Self {
        Self {
            current: current.min(max),
            max,
            consumed: 0,
            pending_credit: 0,
            last_update: None,
        }
    }

    pub fn current(&self) -> ByteCount {
        self.current
    }

    pub fn max(&self) -> ByteCount {
        self.max
    }

    pub fn consumed(&self) -> ByteCount {
        self.consumed
    }

    /// Bytes the peer may still send before hitting the window.
    pub fn remaining(&self) -> ByteCount {
        self.current - self.consumed
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Checks whether `amount` more bytes fit without mutating anything.
    ///
    /// 检查是否还能容纳 `amount` 字节，不做任何修改。
    pub fn check_consume(&self, amount: ByteCount) -> Result<()> {
        match self.consumed.checked_add(amount) {
            Some(total) if total <= self.current => Ok(()),
            _ => Err(Error::FlowControlViolation {
                consumed: self.consumed,
                amount,
                window: self.current,
            }),
        }
    }

    /// Accounts for `amount` bytes received from the peer.
    ///
    /// 记录从对端接收到的 `amount` 字节。
    pub fn on_data_consumed(&mut self, amount: ByteCount) -> Result<()> {
        self.check_consume(amount)?;
        self.consumed += amount;
        trace!(amount, consumed = self.consumed, window = self.current, "Window consumed");
        Ok(())
    }

    /// Returns credit for `amount` bytes the application has read.
    ///
    /// Never retires more than was consumed; returns the bytes actually retired.
    ///
    /// 归还应用程序已读取的 `amount` 字节的额度。释放量不超过已消费量；返回实际释放的字节数。
    pub fn on_data_retired(&mut self, amount: ByteCount) -> ByteCount {
        let amount = amount.min(self.consumed);
        self.consumed -= amount;
        self.pending_credit += amount;
        amount
    }

    /// A window update is due once half the window has been retired.
    pub fn is_update_due(&self) -> bool {
        self.pending_credit > 0 && self.pending_credit >= self.current / 2
    }

    /// Marks a window update as sent and returns the window to advertise.
    ///
    /// 将窗口更新标记为已发送，并返回要通告的窗口。
    pub fn take_window_update(&mut self, now: Instant) -> ByteCount {
        self.pending_credit = 0;
        self.last_update = Some(now);
        self.current
    }

    /// Grows the window toward `target`. The result is never below the current
    /// window and never above `max`.
    ///
    /// 将窗口向 `target` 增长。结果永远不低于当前窗口，也不高于 `max`。
    pub fn raise_to(&mut self, target: ByteCount) -> ByteCount {
        let new = target.clamp(self.current, self.max);
        if new != self.current {
            debug!(old_window = self.current, new_window = new, "Window raised");
            self.current = new;
        }
        self.current
    }

    /// Replaces the window with a freshly negotiated one, keeping the
    /// invariant intact if data was already consumed.
    pub(crate) fn reset_current(&mut self, negotiated: ByteCount) {
        self.current = negotiated.clamp(self.consumed, self.max);
    }

    /// Grows the window when `tuner` reports the peer is window-limited.
    ///
    /// Returns the new window if it changed.
    ///
    /// 当 `tuner` 报告对端受窗口限制时增长窗口。如果窗口发生变化则返回新窗口。
    pub fn maybe_auto_tune(
        &mut self,
        rtt: Duration,
        now: Instant,
        tuner: &dyn AutoTuner,
    ) -> Option<ByteCount> {
        let proposed = tuner.proposed_window(self, rtt, now)?;
        let old = self.current;
        let new = self.raise_to(proposed);
        (new > old).then_some(new)
    }
}
