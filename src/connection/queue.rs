//! Queue of packets that arrived before their keys.
//!
//! 在密钥就绪之前到达的包的队列。

use crate::error::{Error, LimitKind, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::debug;

/// Buffers undecryptable packets until the handshake yields their keys.
///
/// 缓存不可解密的包，直到握手产生对应密钥。
#[derive(Debug)]
pub struct UndecryptableQueue {
    packets: VecDeque<Bytes>,
    capacity: usize,
}

impl UndecryptableQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            capacity,
        }
    }

    /// Queues a packet. A full queue rejects the new packet and keeps the
    /// ones already queued.
    ///
    /// 将包加入队列。队列已满时拒绝新包，保留已排队的包。
    pub fn push(&mut self, packet: Bytes) -> Result<()> {
        if self.packets.len() >= self.capacity {
            debug!(
                queued = self.packets.len(),
                len = packet.len(),
                "Dropping undecryptable packet, queue full"
            );
            return Err(Error::LimitExceeded(LimitKind::UndecryptablePackets));
        }
        self.packets.push_back(packet);
        Ok(())
    }

    /// Takes every queued packet, oldest first.
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.packets.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
