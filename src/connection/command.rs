//! Commands accepted and events emitted by the governor actor.
//!
//! 治理器 actor 接受的命令和发出的事件。

use super::governor::{GovernorSnapshot, PeerParameters};
use crate::error::{Error, Result};
use crate::flow_control::WindowUpdate;
use crate::loss::AckOutcome;
use crate::types::{AckRange, ByteCount, ConnectionId, PacketNumber, StreamId};
use bytes::Bytes;
use tokio::sync::oneshot;

/// Commands sent to a governor actor.
///
/// Every mutation of a connection's parameter state travels through this
/// enum, so one task applies them in order.
///
/// 发送到治理器 actor 的命令。连接参数状态的每一次修改都经由此枚举，
/// 从而由同一个任务按顺序执行。
#[derive(Debug)]
pub enum GovernorCommand {
    /// A packet arrived from the packet I/O layer.
    /// 来自包I/O层的一个到达包。
    PacketReceived {
        packet_number: PacketNumber,
        retransmittable: bool,
        /// `None` for fire-and-forget delivery.
        response_tx: Option<oneshot::Sender<Result<bool>>>,
    },
    /// A packet arrived that cannot be decrypted yet.
    /// 到达了一个暂时无法解密的包。
    UndecryptablePacket {
        packet: Bytes,
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// A packet is about to be sent and needs a packet number.
    /// 一个包即将发送，需要分配包号。
    PacketSent {
        retransmittable: bool,
        response_tx: oneshot::Sender<Result<PacketNumber>>,
    },
    /// An ACK frame arrived.
    /// 收到了一个ACK帧。
    AckReceived {
        ranges: Vec<AckRange>,
        response_tx: oneshot::Sender<Result<AckOutcome>>,
    },
    /// The handshake layer finished the handshake.
    /// 握手层完成了握手。
    HandshakeComplete {
        params: PeerParameters,
        response_tx: oneshot::Sender<Result<Vec<Bytes>>>,
    },
    /// The peer opens a stream.
    /// 对端打开一个流。
    OpenStream {
        id: StreamId,
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// A peer-initiated stream was fully closed.
    /// 一个由对端发起的流已完全关闭。
    CloseStream {
        id: StreamId,
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Grow the advertised stream limit.
    /// 增大通告的流限制。
    RaiseStreamLimit {
        response_tx: oneshot::Sender<Result<u32>>,
    },
    /// Stream data arrived from the peer.
    /// 收到来自对端的流数据。
    StreamData {
        id: StreamId,
        amount: ByteCount,
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// The application read data from a stream.
    /// 应用程序从流中读取了数据。
    DataRead { id: StreamId, amount: ByteCount },
    /// Close the connection.
    /// 关闭连接。
    Close,
    /// Report the current enforced values.
    /// 报告当前执行的值。
    Snapshot {
        response_tx: oneshot::Sender<GovernorSnapshot>,
    },
}

/// Decisions a governor hands to its collaborators.
///
/// 治理器交给协作方的决策。
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorEvent {
    /// An ACK frame with these ranges must be sent now.
    /// 必须立即发送包含这些范围的ACK帧。
    SendAck {
        cid: ConnectionId,
        ranges: Vec<AckRange>,
    },
    /// These packets must be retransmitted.
    /// 这些包必须重传。
    Retransmit {
        cid: ConnectionId,
        packet_numbers: Vec<PacketNumber>,
    },
    /// A window update must be sent to the peer.
    /// 必须向对端发送窗口更新。
    WindowUpdate {
        cid: ConnectionId,
        update: WindowUpdate,
    },
    /// The connection state was purged. `error` names the fatal error that
    /// closed it, if any.
    /// 连接状态已被清除。`error` 指明导致关闭的致命错误（若有）。
    Closed {
        cid: ConnectionId,
        error: Option<Error>,
    },
}
