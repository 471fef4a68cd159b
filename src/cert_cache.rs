//! 压缩证书链缓存
//! Compressed certificate chain cache
//!
//! 进程级的固定容量LRU缓存，将压缩上下文映射到压缩后的证书链，
//! 以便在重复的证书链之间分摊压缩开销。
//!
//! A process-wide, fixed-capacity LRU cache mapping a compression context to
//! a compressed certificate chain, so repeat chains are compressed once.

use crate::config::{CacheConfig, NUM_CACHED_CERTIFICATES};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::trace;

/// Identifies one compression context: the certificate chain plus the common
/// certificate sets and cached certificate hashes the client announced.
///
/// 标识一个压缩上下文：证书链，加上客户端声明的公共证书集和已缓存证书哈希。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompressionContextKey([u8; 32]);

impl CompressionContextKey {
    /// Derives the key as a SHA-256 digest over the length-prefixed inputs.
    ///
    /// 以长度前缀输入的 SHA-256 摘要派生该键。
    pub fn new(chain: &[Bytes], common_set_hashes: &[u8], cached_hashes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((chain.len() as u64).to_be_bytes());
        for certificate in chain {
            hasher.update((certificate.len() as u64).to_be_bytes());
            hasher.update(certificate);
        }
        for field in [common_set_hashes, cached_hashes] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Debug, Default)]
struct LruState {
    /// 键 -> (压缩后的证书链, 最近访问序号)
    /// key -> (compressed chain, last access tick)
    entries: HashMap<CompressionContextKey, (Bytes, u64)>,
    /// 访问序号 -> 键，最旧的在前
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, CompressionContextKey>,
    tick: u64,
}

impl LruState {
    fn touch(&mut self, key: &CompressionContextKey) -> Option<Bytes> {
        self.tick += 1;
        let tick = self.tick;
        let (value, last_access) = self.entries.get_mut(key)?;
        self.recency.remove(last_access);
        *last_access = tick;
        self.recency.insert(tick, *key);
        Some(value.clone())
    }

    fn insert(&mut self, key: CompressionContextKey, value: Bytes, capacity: usize) {
        self.tick += 1;
        let tick = self.tick;
        if let Some((_, previous)) = self.entries.insert(key, (value, tick)) {
            self.recency.remove(&previous);
        }
        self.recency.insert(tick, key);

        while self.entries.len() > capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            trace!(key = ?&oldest.as_bytes()[..4], "Evicted least recently used certificate chain");
        }
    }
}

/// Fixed-capacity LRU cache of compressed certificate chains.
///
/// All access goes through a single mutex; compression itself runs outside
/// of it.
///
/// 固定容量的压缩证书链LRU缓存。所有访问都经过同一个互斥锁；压缩本身在锁外执行。
#[derive(Debug)]
pub struct CertChainCache {
    state: Mutex<LruState>,
    capacity: usize,
}

impl CertChainCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
        }
    }

    /// A cache sized by `num_cached_certificates`.
    ///
    /// 按 `num_cached_certificates` 设定容量的缓存。
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.num_cached_certificates)
    }

    /// The process-wide cache, sized by the registry default. Endpoints
    /// built from a `Config` use the cache their `ConnectionTable` owns.
    ///
    /// 进程级缓存，容量取注册表默认值。
    pub fn global() -> &'static CertChainCache {
        static GLOBAL_CERT_CACHE: OnceLock<CertChainCache> = OnceLock::new();
        GLOBAL_CERT_CACHE.get_or_init(|| CertChainCache::new(NUM_CACHED_CERTIFICATES))
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        // The state stays consistent across a panicking holder.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a chain and refreshes its recency.
    pub fn get(&self, key: &CompressionContextKey) -> Option<Bytes> {
        self.lock().touch(key)
    }

    /// Inserts or replaces a chain, evicting the least recently used entry
    /// when over capacity.
    ///
    /// 插入或替换证书链，超出容量时驱逐最久未使用的条目。
    pub fn put(&self, key: CompressionContextKey, compressed: Bytes) {
        self.lock().insert(key, compressed, self.capacity);
    }

    /// Returns the cached chain or compresses it with `compress` and caches
    /// the result. The lock is not held while `compress` runs, so two callers
    /// racing on the same key may both compress.
    ///
    /// 返回缓存的证书链，或用 `compress` 压缩后缓存结果。`compress` 执行期间不持有锁，
    /// 因此同一键上竞争的两个调用者可能都会执行压缩。
    pub fn get_or_insert_with(
        &self,
        key: CompressionContextKey,
        compress: impl FnOnce() -> Bytes,
    ) -> Bytes {
        if let Some(hit) = self.get(&key) {
            return hit;
        }
        let compressed = compress();
        self.put(key, compressed.clone());
        compressed
    }

    pub fn contains(&self, key: &CompressionContextKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
