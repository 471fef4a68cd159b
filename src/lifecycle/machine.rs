//! 握手与空闲超时状态机
//! Handshake and idle timeout state machine
//!
//! 状态机本身不持有定时器：它只根据调用者传入的时间计算截止时间和状态转换，
//! 由拥有连接的任务负责在 `next_deadline` 到期时调用 `poll`。
//!
//! The machine owns no timer. It computes deadlines and transitions from the
//! instants its caller passes in; the task owning the connection calls `poll`
//! when `next_deadline` expires.

use super::state::{ConnectionPhase, IdleTimeoutPhase};
use crate::config::TimeoutConfig;
use crate::error::{Error, Result};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Negotiates the post-handshake idle timeout.
///
/// An unspecified value yields the default. A value below the default is
/// raised to it. A value above the maximum is rejected instead of clamped.
///
/// 协商握手后的空闲超时。未指定时使用默认值；低于默认值时提升至默认值；
/// 高于最大值时拒绝，而不是截断。
pub fn negotiate_idle_timeout(
    config: &TimeoutConfig,
    advertised: Option<Duration>,
) -> Result<Duration> {
    let Some(value) = advertised else {
        return Ok(config.default_idle_timeout);
    };
    if value > config.max_idle_timeout {
        return Err(Error::NegotiationFailed {
            parameter: "idle_timeout_ms",
            value: millis(value),
            max: millis(config.max_idle_timeout),
        });
    }
    Ok(value.max(config.default_idle_timeout))
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Drives one connection through its phases and timeouts.
///
/// 驱动单个连接经历其各个阶段和超时。
#[derive(Debug)]
pub struct TimeoutStateMachine {
    config: TimeoutConfig,
    phase: ConnectionPhase,
    created_at: Instant,
    last_activity: Instant,
    /// 当前生效的空闲超时
    /// The idle timeout currently in force
    idle_timeout: Duration,
    closing_since: Option<Instant>,
    /// 导致连接关闭的致命错误（若有）
    /// The fatal error that closed the connection, if any
    failure: Option<Error>,
}

impl TimeoutStateMachine {
    pub fn new(config: TimeoutConfig, now: Instant) -> Self {
        let idle_timeout = config.initial_idle_timeout;
        Self {
            config,
            phase: ConnectionPhase::AwaitingHandshake,
            created_at: now,
            last_activity: now,
            idle_timeout,
            closing_since: None,
            failure: None,
        }
    }

    fn transition(&mut self, next: ConnectionPhase) -> bool {
        if !self.phase.is_valid_transition(next) {
            debug!(from = ?self.phase, to = ?next, "Ignoring invalid phase transition");
            return false;
        }
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "Connection phase changed");
            self.phase = next;
        }
        true
    }

    /// Closes the connection immediately because of a fatal error and hands
    /// the error back.
    ///
    /// 因致命错误立即关闭连接，并将该错误返回。
    pub fn abort<T>(&mut self, error: Error) -> Result<T> {
        warn!(%error, phase = ?self.phase, "Closing connection on fatal error");
        self.transition(ConnectionPhase::Closed);
        self.closing_since = None;
        self.failure = Some(error.clone());
        Err(error)
    }

    /// Records a received packet.
    ///
    /// Returns whether the connection id is still recognized. Packets reset
    /// the idle timer while the connection is active; during `Closing` they
    /// are absorbed without extending its lifetime.
    ///
    /// 记录一个收到的包。返回连接ID是否仍被识别。连接活跃时收包会重置空闲定时器；
    /// 在 `Closing` 阶段包会被吸收，但不会延长连接的生命周期。
    pub fn on_packet_received(&mut self, now: Instant) -> bool {
        if self.phase.is_active() {
            self.last_activity = self.last_activity.max(now);
        }
        self.phase.is_recognized()
    }

    /// Completes the handshake and installs the negotiated idle timeout.
    ///
    /// A negotiation failure is fatal and closes the connection.
    ///
    /// 完成握手并安装协商后的空闲超时。协商失败是致命的，会关闭连接。
    pub fn on_handshake_complete(
        &mut self,
        now: Instant,
        advertised_idle_timeout: Option<Duration>,
    ) -> Result<Duration> {
        match self.phase {
            ConnectionPhase::AwaitingHandshake => {}
            ConnectionPhase::Established => return Ok(self.idle_timeout),
            ConnectionPhase::Closing | ConnectionPhase::Closed => {
                return Err(Error::ConnectionClosed);
            }
        }

        let negotiated = match negotiate_idle_timeout(&self.config, advertised_idle_timeout) {
            Ok(negotiated) => negotiated,
            Err(e) => return self.abort(e),
        };
        self.transition(ConnectionPhase::Established);
        self.idle_timeout = negotiated;
        self.last_activity = now;
        info!(
            idle_timeout_ms = millis(negotiated),
            handshake_ms = millis(now.saturating_duration_since(self.created_at)),
            "Handshake complete"
        );
        Ok(negotiated)
    }

    /// Starts closing the connection, locally or on behalf of the peer.
    ///
    /// Returns `false` if the connection was already closing or closed.
    ///
    /// 开始关闭连接（本地发起或代表对端）。若连接已在关闭或已关闭，返回 `false`。
    pub fn close(&mut self, now: Instant) -> bool {
        if !self.phase.is_active() {
            return false;
        }
        self.transition(ConnectionPhase::Closing);
        self.closing_since = Some(now);
        info!(
            grace_ms = millis(self.config.closed_session_delete_timeout),
            "Connection closing"
        );
        true
    }

    /// Applies every deadline that has passed by `now`.
    ///
    /// Returns `HandshakeTimeout` or `IdleTimeout` when the connection is
    /// closed by this call. A closing connection is purged silently once the
    /// delete timeout elapses.
    ///
    /// 应用截至 `now` 已过期的所有截止时间。若本次调用导致连接关闭，返回
    /// `HandshakeTimeout` 或 `IdleTimeout`。关闭中的连接在删除超时后被静默清除。
    pub fn poll(&mut self, now: Instant) -> Result<()> {
        match self.phase {
            ConnectionPhase::AwaitingHandshake => {
                if now >= self.handshake_deadline() {
                    return self.abort(Error::HandshakeTimeout);
                }
                if now >= self.idle_deadline() {
                    return self.abort(Error::IdleTimeout);
                }
            }
            ConnectionPhase::Established => {
                if now >= self.idle_deadline() {
                    return self.abort(Error::IdleTimeout);
                }
            }
            ConnectionPhase::Closing => {
                if self.purge_deadline().is_some_and(|deadline| now >= deadline) {
                    self.transition(ConnectionPhase::Closed);
                    self.closing_since = None;
                    info!("Connection state purged");
                }
            }
            ConnectionPhase::Closed => {}
        }
        Ok(())
    }

    fn handshake_deadline(&self) -> Instant {
        self.created_at + self.config.max_time_for_crypto_handshake
    }

    fn idle_deadline(&self) -> Instant {
        self.last_activity + self.idle_timeout
    }

    fn purge_deadline(&self) -> Option<Instant> {
        self.closing_since
            .map(|since| since + self.config.closed_session_delete_timeout)
    }

    /// The earliest instant at which `poll` changes something, `None` once closed.
    ///
    /// `poll` 将产生变化的最早时刻；连接关闭后为 `None`。
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            ConnectionPhase::AwaitingHandshake => {
                Some(self.handshake_deadline().min(self.idle_deadline()))
            }
            ConnectionPhase::Established => Some(self.idle_deadline()),
            ConnectionPhase::Closing => self.purge_deadline(),
            ConnectionPhase::Closed => None,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn idle_phase(&self) -> Option<IdleTimeoutPhase> {
        self.phase.idle_phase()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// The fatal error that closed the connection, if it was closed by one.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub fn is_recognized(&self) -> bool {
        self.phase.is_recognized()
    }

    pub fn is_purged(&self) -> bool {
        self.phase == ConnectionPhase::Closed
    }
}
