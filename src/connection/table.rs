//! The table of live connections.
//!
//! Maps connection ids to governor handles. A connection id stays
//! recognized while its governor runs, including the closing grace period,
//! and is forgotten when the actor exits.
//!
//! 活跃连接表：将连接ID映射到治理器句柄。治理器运行期间（包括关闭宽限期）
//! 连接ID保持被识别，actor 退出时被遗忘。

use super::actor::{GovernorActor, GovernorHandle};
use super::command::GovernorEvent;
use super::governor::ConnectionGovernor;
use crate::cert_cache::CertChainCache;
use crate::config::Config;
use crate::error::Result;
use crate::types::{ConnectionId, Perspective};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Removes a connection from the table when its actor task ends.
///
/// 在 actor 任务结束时将连接从表中移除。
struct ConnectionCleaner {
    cid: ConnectionId,
    connections: Arc<DashMap<ConnectionId, GovernorHandle>>,
}

impl Drop for ConnectionCleaner {
    fn drop(&mut self) {
        if self.connections.remove(&self.cid).is_some() {
            trace!(cid = self.cid, "Connection forgotten");
        }
    }
}

/// Owns the governors of every connection of one endpoint.
///
/// 拥有一个端点所有连接的治理器。
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    connections: Arc<DashMap<ConnectionId, GovernorHandle>>,
    config: Arc<Config>,
    cert_cache: Arc<CertChainCache>,
    local: Perspective,
    event_tx: mpsc::Sender<GovernorEvent>,
}

impl ConnectionTable {
    /// Creates a table after validating the configuration. The table owns a
    /// certificate chain cache sized by `config.cache`.
    pub fn new(
        config: Config,
        local: Perspective,
        event_tx: mpsc::Sender<GovernorEvent>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connections: Arc::new(DashMap::new()),
            cert_cache: Arc::new(CertChainCache::from_config(&config.cache)),
            config: Arc::new(config),
            local,
            event_tx,
        })
    }

    /// Returns the governor for `cid`, spawning one if the id is unknown.
    ///
    /// 返回 `cid` 的治理器；若该ID未知则启动一个新的治理器。
    pub fn get_or_spawn(&self, cid: ConnectionId) -> GovernorHandle {
        match self.connections.entry(cid) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let governor = ConnectionGovernor::new(
                    cid,
                    Arc::clone(&self.config),
                    self.local,
                    Instant::now(),
                );
                let (actor, handle) = GovernorActor::new(
                    governor,
                    self.config.connection.max_session_unprocessed_packets,
                    self.event_tx.clone(),
                );
                entry.insert(handle.clone());

                let cleaner = ConnectionCleaner {
                    cid,
                    connections: Arc::clone(&self.connections),
                };
                tokio::spawn(async move {
                    let _cleaner = cleaner;
                    actor.run().await;
                });
                debug!(cid, "Spawned connection governor");
                handle
            }
        }
    }

    pub fn get(&self, cid: ConnectionId) -> Option<GovernorHandle> {
        self.connections.get(&cid).map(|entry| entry.value().clone())
    }

    /// Whether packets for `cid` belong to a known connection.
    pub fn is_recognized(&self, cid: ConnectionId) -> bool {
        self.connections.contains_key(&cid)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The compressed certificate chain cache shared by this endpoint.
    ///
    /// 此端点共享的压缩证书链缓存。
    pub fn cert_cache(&self) -> &Arc<CertChainCache> {
        &self.cert_cache
    }
}
