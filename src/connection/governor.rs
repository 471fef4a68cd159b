//! The per-connection state block.
//!
//! `ConnectionGovernor` owns every limit, window and schedule of one
//! connection. It is plain synchronous state: callers pass in the current
//! instant, and the actor in `super::actor` serializes access to it.
//!
//! 每个连接的状态块。`ConnectionGovernor` 拥有一个连接的所有限制、窗口和调度。
//! 它是纯同步状态：调用者传入当前时刻，由 `super::actor` 中的 actor 串行化访问。

use super::queue::UndecryptableQueue;
use crate::ack::AckScheduler;
use crate::config::Config;
use crate::congestion::CongestionWindow;
use crate::error::{Error, Result};
use crate::flow_control::{
    FlowControlNegotiator, FlowControlWindow, RttAutoTuner, WindowAdvertisement, WindowUpdate,
};
use crate::lifecycle::machine::millis;
use crate::lifecycle::{ConnectionPhase, TimeoutStateMachine};
use crate::loss::{AckOutcome, PacketNumberGenerator, ReceivedPacketHistory, SentPacketTracker};
use crate::stream::{StreamLimit, StreamLimiter};
use crate::types::{AckRange, ByteCount, ConnectionId, PacketNumber, Perspective, StreamId};
use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Transport parameters the peer advertised during the handshake.
///
/// 对端在握手期间通告的传输参数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerParameters {
    pub idle_timeout: Option<Duration>,
    pub stream_window: WindowAdvertisement,
    pub connection_window: WindowAdvertisement,
}

/// A point-in-time view of a governor's enforced values.
///
/// 治理器当前执行值的快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorSnapshot {
    pub phase: ConnectionPhase,
    pub idle_timeout: Duration,
    pub congestion_window: u32,
    pub stream_limit: StreamLimit,
    pub open_streams: u32,
    pub connection_window: ByteCount,
    pub in_flight: usize,
    pub undecryptable: usize,
}

/// Owns all parameter state of one connection.
///
/// 拥有一个连接的全部参数状态。
#[derive(Debug)]
pub struct ConnectionGovernor {
    cid: ConnectionId,
    streams: StreamLimiter,
    flow_control: FlowControlNegotiator,
    congestion: CongestionWindow,
    packet_numbers: PacketNumberGenerator<StdRng>,
    sent: SentPacketTracker,
    received: ReceivedPacketHistory,
    ack: AckScheduler,
    timeouts: TimeoutStateMachine,
    undecryptable: UndecryptableQueue,
    /// 最近一次RTT样本
    /// Most recent RTT sample
    latest_rtt: Option<Duration>,
}

impl ConnectionGovernor {
    /// Creates the state block with an OS-seeded skip schedule.
    pub fn new(cid: ConnectionId, config: Arc<Config>, local: Perspective, now: Instant) -> Self {
        Self::with_rng(cid, config, local, now, StdRng::from_os_rng())
    }

    /// Creates the state block with the given random source for packet-number
    /// skipping.
    ///
    /// 使用给定的随机源（用于包号跳跃）创建状态块。
    pub fn with_rng(
        cid: ConnectionId,
        config: Arc<Config>,
        local: Perspective,
        now: Instant,
        rng: StdRng,
    ) -> Self {
        trace!(cid, ?local, "Creating connection governor");
        Self {
            cid,
            streams: StreamLimiter::new(config.streams.clone(), local),
            flow_control: FlowControlNegotiator::new(
                config.flow_control.clone(),
                Box::new(RttAutoTuner),
            ),
            congestion: CongestionWindow::new(config.congestion.clone()),
            packet_numbers: PacketNumberGenerator::new(&config.reliability, rng),
            sent: SentPacketTracker::new(&config.reliability),
            received: ReceivedPacketHistory::new(&config.reliability),
            ack: AckScheduler::new(config.ack.clone()),
            timeouts: TimeoutStateMachine::new(config.timeouts.clone(), now),
            undecryptable: UndecryptableQueue::new(config.connection.max_undecryptable_packets),
            latest_rtt: None,
        }
    }

    /// Closes the connection on fatal errors; passes everything else through.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Err(e) if e.is_fatal() => self.timeouts.abort(e),
            other => other,
        }
    }

    /// Applies deadlines that expired before `now`, so a late event cannot
    /// revive a connection that has already timed out.
    ///
    /// 应用在 `now` 之前已到期的截止时间，使迟到的事件无法复活已超时的连接。
    fn expire(&mut self, now: Instant) -> Result<()> {
        self.timeouts.poll(now)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.timeouts.phase().is_active() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    // --- packet events ---

    /// Records a received packet.
    ///
    /// Returns `Ok(true)` for a new packet, `Ok(false)` for duplicates and for
    /// packets absorbed while closing. Packets for a purged connection are
    /// `ConnectionClosed`.
    ///
    /// 记录一个收到的包。新包返回 `Ok(true)`；重复包以及关闭期间被吸收的包返回
    /// `Ok(false)`；已清除连接的包返回 `ConnectionClosed`。
    pub fn on_packet_received(
        &mut self,
        packet_number: PacketNumber,
        retransmittable: bool,
        now: Instant,
    ) -> Result<bool> {
        self.expire(now)?;
        if !self.timeouts.on_packet_received(now) {
            return Err(Error::ConnectionClosed);
        }
        if !self.timeouts.phase().is_active() {
            trace!(cid = self.cid, packet_number, "Absorbing packet while closing");
            return Ok(false);
        }
        if !self.received.on_packet_received(packet_number) {
            trace!(cid = self.cid, packet_number, "Duplicate or stale packet");
            return Ok(false);
        }
        self.ack.on_packet_received(retransmittable, now);
        Ok(true)
    }

    /// Buffers a packet that cannot be decrypted yet.
    pub fn on_undecryptable_packet(&mut self, packet: Bytes) -> Result<()> {
        self.ensure_active()?;
        self.undecryptable.push(packet)
    }

    /// Assigns a packet number to an outgoing packet and starts tracking it.
    ///
    /// 为外发包分配包号并开始跟踪。
    pub fn on_packet_sent(&mut self, retransmittable: bool, now: Instant) -> Result<PacketNumber> {
        self.expire(now)?;
        self.ensure_active()?;
        let packet_number = self.packet_numbers.peek();
        self.sent.on_packet_sent(packet_number, now, retransmittable)?;
        Ok(self.packet_numbers.pop())
    }

    /// Whether the congestion window admits another retransmittable packet.
    pub fn can_send(&self) -> bool {
        self.congestion.can_send(self.sent.retransmittable_in_flight())
    }

    /// Processes an incoming ACK frame.
    ///
    /// Acknowledged packets grow the congestion window; a NACK-triggered
    /// retransmission or loss halves it once per ACK. `OptimisticAck` and
    /// `InvalidAck` close the connection.
    ///
    /// 处理收到的ACK帧。被确认的包增大拥塞窗口；NACK触发的重传或丢包使其每个ACK
    /// 减半一次。`OptimisticAck` 和 `InvalidAck` 会关闭连接。
    pub fn on_ack_received(&mut self, ranges: &[AckRange], now: Instant) -> Result<AckOutcome> {
        self.expire(now)?;
        self.ensure_active()?;
        let result = self
            .sent
            .on_ack_received(ranges, now, self.packet_numbers.skipped());
        let outcome = self.guard(result)?;

        if let Some(rtt) = outcome.rtt_sample {
            self.latest_rtt = Some(rtt);
        }
        if !outcome.newly_acked.is_empty() {
            let acked = u32::try_from(outcome.newly_acked.len()).unwrap_or(u32::MAX);
            self.congestion.grow(acked);
        }
        if !outcome.to_retransmit.is_empty() || !outcome.lost.is_empty() {
            self.congestion.shrink(0.5);
        }
        Ok(outcome)
    }

    /// Hands a NACKed packet over for retransmission.
    pub fn take_for_retransmission(&mut self, packet_number: PacketNumber) -> bool {
        self.sent.take_for_retransmission(packet_number).is_some()
    }

    /// Whether an ACK must go out now.
    pub fn should_send_ack(&self, now: Instant) -> bool {
        self.timeouts.phase().is_active() && self.ack.should_send_ack_now(now)
    }

    /// Builds the ranges for an outgoing ACK and resets the ACK counters.
    ///
    /// 构建外发ACK的范围并重置ACK计数器。
    pub fn take_ack_ranges(&mut self) -> Vec<AckRange> {
        self.ack.on_ack_sent();
        self.received.ack_ranges()
    }

    /// Stops acknowledging packets below `packet_number`.
    pub fn on_stop_waiting(&mut self, packet_number: PacketNumber) {
        self.received.ignore_below(packet_number);
    }

    // --- handshake ---

    /// Applies the peer's transport parameters once the handshake completes
    /// and returns the queued undecryptable packets for reprocessing.
    ///
    /// 握手完成时应用对端的传输参数，并返回排队的不可解密包以供重新处理。
    pub fn on_handshake_complete(
        &mut self,
        params: PeerParameters,
        now: Instant,
    ) -> Result<Vec<Bytes>> {
        self.expire(now)?;
        self.ensure_active()?;
        let windows = self
            .flow_control
            .apply_initial_windows(params.stream_window, params.connection_window);
        self.guard(windows)?;
        let idle_timeout = self.timeouts.on_handshake_complete(now, params.idle_timeout)?;
        info!(
            cid = self.cid,
            idle_timeout_ms = millis(idle_timeout),
            stream_window = self.flow_control.stream_initial_window(),
            connection_window = self.flow_control.connection_window().current(),
            "Connection established"
        );
        Ok(self.undecryptable.drain())
    }

    // --- streams & flow control ---

    /// Admits a peer-initiated stream and opens its window.
    pub fn open_incoming_stream(&mut self, id: StreamId) -> Result<()> {
        self.ensure_active()?;
        self.streams.admit_incoming(id)?;
        self.flow_control.open_stream(id);
        Ok(())
    }

    /// Forgets a fully closed peer-initiated stream. Only a stream that is
    /// open frees a slot under the stream limit.
    ///
    /// 遗忘一个已完全关闭的对端发起流。只有处于打开状态的流才会释放流限制下的名额。
    pub fn close_stream(&mut self, id: StreamId) -> Result<()> {
        if !self.flow_control.close_stream(id) {
            debug!(cid = self.cid, stream_id = %id, "Close for a stream that is not open");
            return Err(Error::UnknownStream { id: id.0 });
        }
        self.streams.on_stream_closed();
        Ok(())
    }

    /// Grows the advertised stream limit by one step.
    pub fn raise_stream_limit(&mut self) -> Result<u32> {
        self.streams.raise_limit()
    }

    /// Checks a stream's reassembly state for too many gaps.
    pub fn check_frame_sorter_gaps(&self, gaps: usize) -> Result<()> {
        self.streams.check_frame_sorter_gaps(gaps)
    }

    /// Accounts for stream data received from the peer. A window violation
    /// closes the connection.
    ///
    /// 记录从对端收到的流数据。窗口违规会关闭连接。
    pub fn on_stream_data(&mut self, id: StreamId, amount: ByteCount) -> Result<()> {
        self.ensure_active()?;
        let result = self.flow_control.on_data_consumed(id, amount);
        self.guard(result)
    }

    /// Credits bytes the application read from a stream.
    pub fn on_data_read(&mut self, id: StreamId, amount: ByteCount) {
        self.flow_control.on_data_retired(id, amount);
    }

    /// Collects due window updates. Auto-tuning only kicks in once an RTT
    /// sample exists.
    ///
    /// 收集到期的窗口更新。只有在存在RTT样本后才会进行自动调整。
    pub fn window_updates(&mut self, now: Instant) -> Vec<WindowUpdate> {
        let rtt = self.latest_rtt.unwrap_or(Duration::ZERO);
        self.flow_control.window_updates(rtt, now)
    }

    // --- lifecycle ---

    /// Starts closing the connection.
    pub fn close(&mut self, now: Instant) -> bool {
        let closing = self.timeouts.close(now);
        if closing {
            debug!(cid = self.cid, "Connection governor closing");
            self.sent.clear();
            self.undecryptable.drain();
        }
        closing
    }

    /// Applies expired deadlines. Timeouts close the connection and are
    /// returned as errors.
    pub fn poll_timeouts(&mut self, now: Instant) -> Result<()> {
        self.timeouts.poll(now)
    }

    /// The next instant at which the governor needs attention: a lifecycle
    /// deadline or the ACK delay, whichever comes first.
    ///
    /// 治理器下一次需要处理的时刻：生命周期截止时间或ACK延迟，取较早者。
    pub fn next_deadline(&self) -> Option<Instant> {
        let lifecycle = self.timeouts.next_deadline();
        let ack = if self.timeouts.phase().is_active() {
            self.ack.ack_deadline()
        } else {
            None
        };
        match (lifecycle, ack) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // --- accessors ---

    pub fn snapshot(&self) -> GovernorSnapshot {
        GovernorSnapshot {
            phase: self.phase(),
            idle_timeout: self.idle_timeout(),
            congestion_window: self.congestion.window(),
            stream_limit: self.streams.limit(),
            open_streams: self.streams.open_streams(),
            connection_window: self.flow_control.connection_window().current(),
            in_flight: self.sent.len(),
            undecryptable: self.undecryptable.len(),
        }
    }

    pub fn cid(&self) -> ConnectionId {
        self.cid
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.timeouts.phase()
    }

    /// The fatal error that closed the connection, if any.
    pub fn failure(&self) -> Option<&Error> {
        self.timeouts.failure()
    }

    pub fn is_recognized(&self) -> bool {
        self.timeouts.is_recognized()
    }

    pub fn is_purged(&self) -> bool {
        self.timeouts.is_purged()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.timeouts.idle_timeout()
    }

    pub fn stream_limit(&self) -> StreamLimit {
        self.streams.limit()
    }

    pub fn congestion_window(&self) -> u32 {
        self.congestion.window()
    }

    pub fn connection_window(&self) -> &FlowControlWindow {
        self.flow_control.connection_window()
    }

    pub fn stream_window(&self, id: StreamId) -> Option<&FlowControlWindow> {
        self.flow_control.stream_window(id)
    }

    pub fn undecryptable_len(&self) -> usize {
        self.undecryptable.len()
    }

    pub fn in_flight(&self) -> usize {
        self.sent.len()
    }

    pub fn latest_rtt(&self) -> Option<Duration> {
        self.latest_rtt
    }
}
