//! Congestion window bounds.
//! 拥塞窗口边界。
//!
//! The congestion-control algorithm itself lives elsewhere. This module only
//! provides the growth and shrink primitives such an algorithm must respect.
//!
//! 拥塞控制算法本身不在此处。本模块只提供该算法必须遵守的增长与收缩原语。

use crate::config::CongestionConfig;
use tracing::{debug, trace};


/// A congestion window in packets, bounded by the registry.
///
/// 以包为单位、受注册表约束的拥塞窗口。
#[derive(Debug, Clone)]
pub struct CongestionWindow {
    window: u32,
    config: CongestionConfig,
}

impl CongestionWindow {
    pub fn new(config: CongestionConfig) -> Self {
        Self {
            window: config.initial_window_packets,
            config,
        }
    }

    /// Gets the current congestion window size in packets.
    ///
    /// 获取当前的拥塞窗口大小（以包为单位）。
    pub fn window(&self) -> u32 {
        self.window
    }

    /// Grows the window by `packets`, saturating at the maximum.
    ///
    /// 将窗口增大 `packets`，在上限处饱和。
    pub fn grow(&mut self, packets: u32) -> u32 {
        let old = self.window;
        self.window = self
            .window
            .saturating_add(packets)
            .min(self.config.max_window_packets);
        if old != self.window {
            trace!(old_cwnd = old, new_cwnd = self.window, "Congestion window grown");
        }
        self.window
    }

    /// Multiplies the window by `factor` (expected in `0.0..=1.0`), never
    /// dropping below the minimum.
    ///
    /// 将窗口乘以 `factor`（应在 `0.0..=1.0` 内），永远不低于最小值。
    pub fn shrink(&mut self, factor: f32) -> u32 {
        let old = self.window;
        let scaled = (self.window as f32 * factor.clamp(0.0, 1.0)) as u32;
        self.window = scaled.max(self.config.min_window_packets);
        debug!(old_cwnd = old, new_cwnd = self.window, factor, "Congestion window shrunk");
        self.window
    }

    /// Returns to the initial window, e.g. after a retransmission timeout.
    pub fn reset(&mut self) {
        self.window = self.config.initial_window_packets;
    }

    /// Whether another packet may be put in flight.
    pub fn can_send(&self, in_flight: usize) -> bool {
        in_flight < self.window as usize
    }
}
