//! 流量控制协商器 - 统一管理连接级和流级窗口
//! Flow Control Negotiator - unified management of connection and stream windows
//!
//! 职责：
//! - 协商初始窗口
//! - 在两级窗口上同时执行消费检查
//! - 自动调整并生成窗口更新

use super::tuner::AutoTuner;
use super::window::FlowControlWindow;
use crate::config::FlowControlConfig;
use crate::error::{Error, Result};
use crate::types::{ByteCount, StreamId};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Which level a window applies to. Stream and connection windows have
/// different defaults and maxima.
///
/// 窗口适用的层级。流级和连接级窗口具有不同的默认值和上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowScope {
    Stream,
    Connection,
}

impl WindowScope {
    fn default_window(self, config: &FlowControlConfig) -> ByteCount {
        match self {
            WindowScope::Stream => config.stream_receive_window,
            WindowScope::Connection => config.connection_receive_window,
        }
    }

    fn absolute_max(self, config: &FlowControlConfig) -> ByteCount {
        match self {
            WindowScope::Stream => config.max_stream_receive_window,
            WindowScope::Connection => config.max_connection_receive_window,
        }
    }

    fn parameter_name(self) -> &'static str {
        match self {
            WindowScope::Stream => "stream flow control window",
            WindowScope::Connection => "connection flow control window",
        }
    }
}

/// A window value from transport-parameter negotiation.
///
/// 来自传输参数协商的窗口值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowAdvertisement {
    /// Nothing was advertised; the registry default applies.
    /// 未通告；使用注册表默认值。
    #[default]
    Unspecified,
    /// A plain advertisement, never opening wider than the registry default.
    /// 普通通告，打开的窗口不会超过注册表默认值。
    Advertised(ByteCount),
    /// A value the handshake parameters explicitly raised.
    /// 握手参数显式提升的值。
    Raised(ByteCount),
}

/// Computes the opening window for `scope`.
///
/// Values above the scope's absolute maximum are a negotiation failure rather
/// than being clamped.
///
/// 计算 `scope` 的初始窗口。高于该层级绝对上限的值视为协商失败，而不是被截断。
pub fn negotiate_initial(
    config: &FlowControlConfig,
    scope: WindowScope,
    advertisement: WindowAdvertisement,
) -> Result<ByteCount> {
    let default = scope.default_window(config);
    let max = scope.absolute_max(config);
    let value = match advertisement {
        WindowAdvertisement::Unspecified => return Ok(default),
        WindowAdvertisement::Advertised(value) | WindowAdvertisement::Raised(value) => value,
    };
    if value > max {
        warn!(?scope, value, max, "Peer advertised a window above the hard maximum");
        return Err(Error::NegotiationFailed {
            parameter: scope.parameter_name(),
            value,
            max,
        });
    }
    Ok(match advertisement {
        WindowAdvertisement::Raised(_) => value,
        _ => value.min(default),
    })
}

/// A window update to be sent to the peer.
///
/// 要发送给对端的窗口更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    /// `None` for the connection-level window.
    /// 连接级窗口为 `None`。
    pub stream_id: Option<StreamId>,
    pub window: ByteCount,
}

/// Owns the connection window and every stream window of one connection.
///
/// 拥有一个连接的连接级窗口和所有流级窗口。
#[derive(Debug)]
pub struct FlowControlNegotiator {
    config: FlowControlConfig,
    connection: FlowControlWindow,
    streams: HashMap<StreamId, FlowControlWindow>,
    /// The window new streams open with.
    stream_initial: ByteCount,
    tuner: Box<dyn AutoTuner>,
}

impl FlowControlNegotiator {
    /// Creates a negotiator with registry defaults at both levels.
    pub fn new(config: FlowControlConfig, tuner: Box<dyn AutoTuner>) -> Self {
        Self {
            connection: FlowControlWindow::new(
                config.connection_receive_window,
                config.max_connection_receive_window,
            ),
            streams: HashMap::new(),
            stream_initial: config.stream_receive_window,
            config,
            tuner,
        }
    }

    /// Applies the windows agreed during the handshake.
    ///
    /// The connection window is replaced; streams opened afterwards use the
    /// negotiated stream window.
    ///
    /// 应用握手期间商定的窗口。替换连接级窗口；此后打开的流使用协商的流级窗口。
    pub fn apply_initial_windows(
        &mut self,
        stream: WindowAdvertisement,
        connection: WindowAdvertisement,
    ) -> Result<()> {
        let stream_initial = negotiate_initial(&self.config, WindowScope::Stream, stream)?;
        let connection_initial =
            negotiate_initial(&self.config, WindowScope::Connection, connection)?;
        self.stream_initial = stream_initial;
        self.connection.reset_current(connection_initial);
        debug!(
            stream_window = stream_initial,
            connection_window = self.connection.current(),
            "Initial flow control windows negotiated"
        );
        Ok(())
    }

    /// Opens the window of a newly admitted stream. Opening twice is a no-op.
    /// Data is only accepted on streams opened here.
    pub fn open_stream(&mut self, id: StreamId) {
        let (initial, max) = (self.stream_initial, self.config.max_stream_receive_window);
        self.streams
            .entry(id)
            .or_insert_with(|| FlowControlWindow::new(initial, max));
    }

    /// Forgets a stream's window and returns its unread bytes to the
    /// connection window. Returns whether the stream was open.
    ///
    /// 遗忘流的窗口，并将其未读字节归还给连接窗口。返回该流是否处于打开状态。
    pub fn close_stream(&mut self, id: StreamId) -> bool {
        let Some(stream) = self.streams.remove(&id) else {
            return false;
        };
        let outstanding = stream.consumed();
        if outstanding > 0 {
            self.connection.on_data_retired(outstanding);
            trace!(stream_id = %id, outstanding, "Closed stream released connection credit");
        }
        true
    }

    /// Accounts for `amount` bytes received on stream `id`.
    ///
    /// Both windows are checked before either is mutated, so a violation
    /// leaves all accounting untouched.
    ///
    /// 记录在流 `id` 上收到的 `amount` 字节。两个窗口都检查通过后才会修改，
    /// 因此违规时所有记账保持不变。
    pub fn on_data_consumed(&mut self, id: StreamId, amount: ByteCount) -> Result<()> {
        let Some(stream) = self.streams.get_mut(&id) else {
            debug!(stream_id = %id, amount, "Data for a stream that is not open");
            return Err(Error::UnknownStream { id: id.0 });
        };
        if let Err(err) = stream
            .check_consume(amount)
            .and_then(|()| self.connection.check_consume(amount))
        {
            warn!(stream_id = %id, amount, error = %err, "Flow control violation");
            return Err(err);
        }
        stream.on_data_consumed(amount)?;
        self.connection.on_data_consumed(amount)
    }

    /// Returns credit for bytes the application read from stream `id`.
    ///
    /// The connection is credited only with what the stream actually
    /// retired, so its `consumed` never drops below the sum over open streams.
    ///
    /// 归还应用程序从流 `id` 读取的字节额度。连接只按流实际释放的量获得额度，
    /// 因此其 `consumed` 永远不低于各打开流之和。
    pub fn on_data_retired(&mut self, id: StreamId, amount: ByteCount) -> ByteCount {
        let Some(stream) = self.streams.get_mut(&id) else {
            trace!(stream_id = %id, amount, "Ignoring read on a stream that is not open");
            return 0;
        };
        let retired = stream.on_data_retired(amount);
        self.connection.on_data_retired(retired);
        trace!(stream_id = %id, retired, "Data retired");
        retired
    }

    /// Auto-tunes one stream window. A tuned stream window drags the
    /// connection window along to `connection_window_multiplier` times its size.
    ///
    /// 自动调整单个流窗口。调整后的流窗口会把连接窗口提升到其 `connection_window_multiplier` 倍。
    pub fn maybe_auto_tune_stream(
        &mut self,
        id: StreamId,
        rtt: Duration,
        now: Instant,
    ) -> Option<ByteCount> {
        let stream = self.streams.get_mut(&id)?;
        let tuned = stream.maybe_auto_tune(rtt, now, self.tuner.as_ref())?;
        let target = (tuned as f64 * self.config.connection_window_multiplier) as ByteCount;
        self.connection.raise_to(target);
        debug!(stream_id = %id, window = tuned, "Stream window auto-tuned");
        Some(tuned)
    }

    /// Auto-tunes the connection window.
    pub fn maybe_auto_tune_connection(&mut self, rtt: Duration, now: Instant) -> Option<ByteCount> {
        self.connection
            .maybe_auto_tune(rtt, now, self.tuner.as_ref())
    }

    /// Collects every due window update, auto-tuning each window first.
    ///
    /// 收集所有到期的窗口更新，每个窗口先进行自动调整。
    pub fn window_updates(&mut self, rtt: Duration, now: Instant) -> Vec<WindowUpdate> {
        let due: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, window)| window.is_update_due())
            .map(|(id, _)| *id)
            .collect();

        let mut updates = Vec::with_capacity(due.len() + 1);
        for id in due {
            self.maybe_auto_tune_stream(id, rtt, now);
            if let Some(stream) = self.streams.get_mut(&id) {
                updates.push(WindowUpdate {
                    stream_id: Some(id),
                    window: stream.take_window_update(now),
                });
            }
        }

        if self.connection.is_update_due() {
            self.maybe_auto_tune_connection(rtt, now);
            updates.push(WindowUpdate {
                stream_id: None,
                window: self.connection.take_window_update(now),
            });
        }
        updates
    }

    pub fn connection_window(&self) -> &FlowControlWindow {
        &self.connection
    }

    pub fn stream_window(&self, id: StreamId) -> Option<&FlowControlWindow> {
        self.streams.get(&id)
    }

    pub fn stream_initial_window(&self) -> ByteCount {
        self.stream_initial
    }
}
