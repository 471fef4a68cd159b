//! The stream limit formula and the per-connection admission state.
//!
//! 流限制公式以及每个连接的准入状态。

use crate::config::StreamConfig;
use crate::error::{Error, LimitKind, Result};
use crate::types::{Perspective, StreamId};
use tracing::{debug, trace, warn};

/// Computes the next advertised stream limit.
///
/// The limit grows by the larger of the proportional slack
/// `current * (multiplier - 1)` and `minimum_increment`, capped at
/// `absolute_max`. Fails with `LimitExceeded` once `current` has reached
/// `absolute_max`, in which case the caller must not advertise a higher value.
///
/// 计算下一个通告的流限制。
///
/// 限制按比例余量 `current * (multiplier - 1)` 与 `minimum_increment` 中较大者增长，
/// 并以 `absolute_max` 为上限。当 `current` 已达到 `absolute_max` 时返回 `LimitExceeded`。
pub fn compute_next_limit(
    current: u32,
    multiplier: f64,
    minimum_increment: u32,
    absolute_max: u32,
) -> Result<u32> {
    if current >= absolute_max {
        return Err(Error::LimitExceeded(LimitKind::StreamLimit));
    }
    // Float-to-int `as` saturates, so a huge multiplier cannot wrap.
    let proportional = (current as f64 * (multiplier - 1.0)).max(0.0).floor() as u32;
    let delta = proportional.max(minimum_increment);
    Ok(current.saturating_add(delta).min(absolute_max))
}

/// Whether `id` may be opened given the highest id ever opened.
///
/// Ids at or below `highest_opened` are always admissible here; whether such a
/// stream is still open is the frame layer's business. Higher ids must stay
/// within `max_delta` of it.
///
/// 在给定已打开的最高ID的情况下，`id` 是否可以被打开。
pub fn is_stream_id_admissible(id: StreamId, highest_opened: StreamId, max_delta: u32) -> bool {
    id <= highest_opened || id.0 - highest_opened.0 <= max_delta
}

/// The advertised limit on concurrently open streams.
///
/// Invariant: `current <= absolute_max`, and `current` never decreases.
///
/// 通告的并发打开流数量限制。不变量：`current <= absolute_max`，且 `current` 永不减少。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimit {
    current: u32,
    absolute_max: u32,
}

impl StreamLimit {
    pub fn new(current: u32, absolute_max: u32) -> Self {
        Self {
            current: current.min(absolute_max),
            absolute_max,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn absolute_max(&self) -> u32 {
        self.absolute_max
    }
}

/// Per-connection stream admission state for peer-initiated streams.
///
/// 每个连接针对对端发起的流的准入状态。
#[derive(Debug)]
pub struct StreamLimiter {
    limit: StreamLimit,
    /// The peer's parity. Only these ids are admitted.
    peer: Perspective,
    highest_opened: Option<StreamId>,
    open_streams: u32,
    config: StreamConfig,
}

impl StreamLimiter {
    /// Creates a limiter for a connection seen from `local`.
    pub fn new(config: StreamConfig, local: Perspective) -> Self {
        Self {
            limit: StreamLimit::new(
                config.max_incoming_dynamic_streams,
                config.max_streams_absolute,
            ),
            peer: local.opposite(),
            highest_opened: None,
            open_streams: 0,
            config,
        }
    }

    /// Admits a stream the peer wants to open.
    ///
    /// Rejections are local to this one stream; the connection stays alive.
    ///
    /// 接纳对端想要打开的流。拒绝只针对这一条流，连接保持存活。
    pub fn admit_incoming(&mut self, id: StreamId) -> Result<()> {
        if id.initiator() != self.peer {
            warn!(stream_id = %id, "Peer used a stream id of the wrong parity");
            return Err(Error::StreamIdInadmissible {
                id: id.0,
                highest_opened: self.highest_opened.map_or(0, StreamId::as_u32),
            });
        }

        if let Some(highest) = self.highest_opened {
            if !is_stream_id_admissible(id, highest, self.config.max_new_stream_id_delta) {
                warn!(
                    stream_id = %id,
                    highest_opened = %highest,
                    max_delta = self.config.max_new_stream_id_delta,
                    "Rejecting stream id too far above the highest opened"
                );
                return Err(Error::StreamIdInadmissible {
                    id: id.0,
                    highest_opened: highest.0,
                });
            }
        } else if id.0 > self.config.max_new_stream_id_delta {
            // Before any stream is open the distance is measured from zero.
            return Err(Error::StreamIdInadmissible {
                id: id.0,
                highest_opened: 0,
            });
        }

        if self.open_streams >= self.limit.current {
            debug!(
                stream_id = %id,
                open = self.open_streams,
                limit = self.limit.current,
                "Rejecting stream over the advertised limit"
            );
            return Err(Error::LimitExceeded(LimitKind::OpenStreams));
        }

        self.open_streams += 1;
        if self.highest_opened.is_none_or(|highest| id > highest) {
            self.highest_opened = Some(id);
        }
        trace!(stream_id = %id, open = self.open_streams, "Stream admitted");
        Ok(())
    }

    /// Records that a peer-initiated stream has been fully closed.
    pub fn on_stream_closed(&mut self) {
        self.open_streams = self.open_streams.saturating_sub(1);
    }

    /// Grows the advertised limit by one step of slack.
    ///
    /// 将通告的限制增长一步余量。
    pub fn raise_limit(&mut self) -> Result<u32> {
        let old = self.limit.current;
        let new = compute_next_limit(
            old,
            self.config.max_streams_multiplier,
            self.config.max_streams_minimum_increment,
            self.limit.absolute_max,
        )?;
        self.limit.current = new.max(old);
        debug!(old_limit = old, new_limit = self.limit.current, "Stream limit raised");
        Ok(self.limit.current)
    }

    /// Rejects reassembly state that accumulated too many gaps.
    ///
    /// 拒绝积累了过多空洞的重组状态。
    pub fn check_frame_sorter_gaps(&self, gaps: usize) -> Result<()> {
        if gaps > self.config.max_stream_frame_sorter_gaps {
            return Err(Error::LimitExceeded(LimitKind::FrameSorterGaps));
        }
        Ok(())
    }

    pub fn limit(&self) -> StreamLimit {
        self.limit
    }

    pub fn open_streams(&self) -> u32 {
        self.open_streams
    }

    pub fn highest_opened(&self) -> Option<StreamId> {
        self.highest_opened
    }
}
