//! The governor actor and its handle.
//!
//! One tokio task owns a `ConnectionGovernor`. Commands and timer expiry are
//! branches of the same `select!` loop, so nothing mutates the state block
//! from outside that task.
//!
//! 治理器 actor 及其句柄。一个 tokio 任务拥有一个 `ConnectionGovernor`。
//! 命令和定时器到期是同一个 `select!` 循环的分支，因此没有任何东西会从该任务之外修改状态块。

use super::command::{GovernorCommand, GovernorEvent};
use super::governor::{ConnectionGovernor, GovernorSnapshot, PeerParameters};
use crate::error::{Error, LimitKind, Result};
use crate::loss::AckOutcome;
use crate::types::{AckRange, ByteCount, ConnectionId, PacketNumber, StreamId};
use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace};

/// A handle to a running governor actor.
///
/// 运行中的治理器 actor 的句柄。
#[derive(Debug, Clone)]
pub struct GovernorHandle {
    cid: ConnectionId,
    command_tx: mpsc::Sender<GovernorCommand>,
}

impl GovernorHandle {
    pub fn cid(&self) -> ConnectionId {
        self.cid
    }

    /// Whether the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn notify(&self, command: GovernorCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> GovernorCommand,
    ) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.notify(build(response_tx)).await?;
        response_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Queues a received packet without waiting. A full queue drops the
    /// packet with `LimitExceeded`.
    ///
    /// 不等待地将收到的包排队。队列已满时以 `LimitExceeded` 丢弃该包。
    pub fn deliver_packet(
        &self,
        packet_number: PacketNumber,
        retransmittable: bool,
    ) -> Result<()> {
        let command = GovernorCommand::PacketReceived {
            packet_number,
            retransmittable,
            response_tx: None,
        };
        match self.command_tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!(cid = self.cid, packet_number, "Session queue full, dropping packet");
                Err(Error::LimitExceeded(LimitKind::UnprocessedPackets))
            }
            Err(TrySendError::Closed(_)) => Err(Error::ChannelClosed),
        }
    }

    /// Records a received packet and waits for the verdict.
    pub async fn packet_received(
        &self,
        packet_number: PacketNumber,
        retransmittable: bool,
    ) -> Result<bool> {
        self.request(|response_tx| GovernorCommand::PacketReceived {
            packet_number,
            retransmittable,
            response_tx: Some(response_tx),
        })
        .await?
    }

    pub async fn undecryptable_packet(&self, packet: Bytes) -> Result<()> {
        self.request(|response_tx| GovernorCommand::UndecryptablePacket {
            packet,
            response_tx,
        })
        .await?
    }

    pub async fn packet_sent(&self, retransmittable: bool) -> Result<PacketNumber> {
        self.request(|response_tx| GovernorCommand::PacketSent {
            retransmittable,
            response_tx,
        })
        .await?
    }

    pub async fn ack_received(&self, ranges: Vec<AckRange>) -> Result<AckOutcome> {
        self.request(|response_tx| GovernorCommand::AckReceived {
            ranges,
            response_tx,
        })
        .await?
    }

    pub async fn handshake_complete(&self, params: PeerParameters) -> Result<Vec<Bytes>> {
        self.request(|response_tx| GovernorCommand::HandshakeComplete {
            params,
            response_tx,
        })
        .await?
    }

    pub async fn open_stream(&self, id: StreamId) -> Result<()> {
        self.request(|response_tx| GovernorCommand::OpenStream { id, response_tx })
            .await?
    }

    pub async fn close_stream(&self, id: StreamId) -> Result<()> {
        self.request(|response_tx| GovernorCommand::CloseStream { id, response_tx })
            .await?
    }

    pub async fn raise_stream_limit(&self) -> Result<u32> {
        self.request(|response_tx| GovernorCommand::RaiseStreamLimit { response_tx })
            .await?
    }

    pub async fn stream_data(&self, id: StreamId, amount: ByteCount) -> Result<()> {
        self.request(|response_tx| GovernorCommand::StreamData {
            id,
            amount,
            response_tx,
        })
        .await?
    }

    pub async fn data_read(&self, id: StreamId, amount: ByteCount) -> Result<()> {
        self.notify(GovernorCommand::DataRead { id, amount }).await
    }

    pub async fn close(&self) -> Result<()> {
        self.notify(GovernorCommand::Close).await
    }

    pub async fn snapshot(&self) -> Result<GovernorSnapshot> {
        self.request(|response_tx| GovernorCommand::Snapshot { response_tx })
            .await
    }
}

/// The task that owns one `ConnectionGovernor`.
///
/// 拥有一个 `ConnectionGovernor` 的任务。
pub(crate) struct GovernorActor {
    governor: ConnectionGovernor,
    command_rx: mpsc::Receiver<GovernorCommand>,
    event_tx: mpsc::Sender<GovernorEvent>,
}

impl GovernorActor {
    /// Creates the actor and its handle. The command queue holds at most
    /// `queue_capacity` unprocessed commands.
    pub(crate) fn new(
        governor: ConnectionGovernor,
        queue_capacity: usize,
        event_tx: mpsc::Sender<GovernorEvent>,
    ) -> (Self, GovernorHandle) {
        let (command_tx, command_rx) = mpsc::channel(queue_capacity.max(1));
        let handle = GovernorHandle {
            cid: governor.cid(),
            command_tx,
        };
        let actor = Self {
            governor,
            command_rx,
            event_tx,
        };
        (actor, handle)
    }

    /// Runs the actor's main event loop until the connection is purged or
    /// every handle is dropped.
    ///
    /// 运行 actor 的主事件循环，直到连接被清除或所有句柄都被丢弃。
    pub(crate) async fn run(mut self) {
        let cid = self.governor.cid();
        info!(cid, "Governor actor started");

        loop {
            let deadline = self.governor.next_deadline();
            tokio::select! {
                biased;

                // 1. Handle commands from collaborators.
                // 1. 处理来自协作方的命令。
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        let now = Instant::now();
                        // A queued command never outruns an expired deadline.
                        let _ = self.governor.poll_timeouts(now);
                        self.handle_command(command, now).await;
                    }
                    None => {
                        debug!(cid, "All governor handles dropped");
                        break;
                    }
                },

                // 2. Handle the single armed deadline.
                // 2. 处理唯一设置的截止时间。
                () = sleep_until_deadline(deadline) => {
                    // A timeout closes the connection; the error is reported
                    // through the `Closed` event below.
                    let _ = self.governor.poll_timeouts(Instant::now());
                }
            }

            self.follow_up(Instant::now()).await;
            if self.governor.is_purged() {
                break;
            }
        }

        let error = self.governor.failure().cloned();
        info!(cid, ?error, "Governor actor stopped");
        self.emit(GovernorEvent::Closed { cid, error }).await;
    }

    async fn handle_command(&mut self, command: GovernorCommand, now: Instant) {
        let cid = self.governor.cid();
        match command {
            GovernorCommand::PacketReceived {
                packet_number,
                retransmittable,
                response_tx,
            } => {
                let result = self
                    .governor
                    .on_packet_received(packet_number, retransmittable, now);
                match response_tx {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            trace!(cid, packet_number, error = %e, "Dropped received packet");
                        }
                    }
                }
            }
            GovernorCommand::UndecryptablePacket {
                packet,
                response_tx,
            } => {
                let _ = response_tx.send(self.governor.on_undecryptable_packet(packet));
            }
            GovernorCommand::PacketSent {
                retransmittable,
                response_tx,
            } => {
                let _ = response_tx.send(self.governor.on_packet_sent(retransmittable, now));
            }
            GovernorCommand::AckReceived {
                ranges,
                response_tx,
            } => {
                let result = self.governor.on_ack_received(&ranges, now);
                let retransmit: Vec<PacketNumber> = match &result {
                    Ok(outcome) => outcome
                        .to_retransmit
                        .iter()
                        .copied()
                        .filter(|pn| self.governor.take_for_retransmission(*pn))
                        .collect(),
                    Err(_) => Vec::new(),
                };
                let _ = response_tx.send(result);
                if !retransmit.is_empty() {
                    self.emit(GovernorEvent::Retransmit {
                        cid,
                        packet_numbers: retransmit,
                    })
                    .await;
                }
            }
            GovernorCommand::HandshakeComplete {
                params,
                response_tx,
            } => {
                let _ = response_tx.send(self.governor.on_handshake_complete(params, now));
            }
            GovernorCommand::OpenStream { id, response_tx } => {
                let _ = response_tx.send(self.governor.open_incoming_stream(id));
            }
            GovernorCommand::CloseStream { id, response_tx } => {
                let _ = response_tx.send(self.governor.close_stream(id));
            }
            GovernorCommand::RaiseStreamLimit { response_tx } => {
                let _ = response_tx.send(self.governor.raise_stream_limit());
            }
            GovernorCommand::StreamData {
                id,
                amount,
                response_tx,
            } => {
                let _ = response_tx.send(self.governor.on_stream_data(id, amount));
            }
            GovernorCommand::DataRead { id, amount } => {
                self.governor.on_data_read(id, amount);
                for update in self.governor.window_updates(now) {
                    self.emit(GovernorEvent::WindowUpdate { cid, update }).await;
                }
            }
            GovernorCommand::Close => {
                self.governor.close(now);
            }
            GovernorCommand::Snapshot { response_tx } => {
                let _ = response_tx.send(self.governor.snapshot());
            }
        }
    }

    /// Emits an ACK once one is due.
    async fn follow_up(&mut self, now: Instant) {
        if self.governor.should_send_ack(now) {
            let ranges = self.governor.take_ack_ranges();
            if !ranges.is_empty() {
                let cid = self.governor.cid();
                self.emit(GovernorEvent::SendAck { cid, ranges }).await;
            }
        }
    }

    async fn emit(&self, event: GovernorEvent) {
        if self.event_tx.send(event).await.is_err() {
            trace!(cid = self.governor.cid(), "Event receiver dropped");
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Spawns a governor on its own task.
///
/// The command queue is bounded by `max_session_unprocessed_packets`; events
/// go to `event_tx`. The task ends once the connection is purged or every
/// handle is dropped.
///
/// 在独立任务上启动一个治理器。命令队列以 `max_session_unprocessed_packets` 为界；
/// 事件发往 `event_tx`。连接被清除或所有句柄被丢弃后任务结束。
pub fn spawn_governor(
    governor: ConnectionGovernor,
    queue_capacity: usize,
    event_tx: mpsc::Sender<GovernorEvent>,
) -> (GovernorHandle, JoinHandle<()>) {
    let (actor, handle) = GovernorActor::new(governor, queue_capacity, event_tx);
    let task = tokio::spawn(actor.run());
    (handle, task)
}
