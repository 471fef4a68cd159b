//! Handshake bounds.
//!
//! Size limits for crypto handshake messages, the lifetime of the server's
//! ephemeral key exchange key, and source-address token expiry.
//!
//! 握手边界：加密握手消息的大小限制、服务器临时密钥交换密钥的生命周期，
//! 以及源地址令牌（STK）的过期时间。

use crate::config::CryptoConfig;
use crate::error::{Error, LimitKind, Result};
use bytes::Bytes;
use std::time::SystemTime;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// A tagged crypto handshake message as handed over by the handshake layer.
///
/// 由握手层交付的带标签的加密握手消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoMessage {
    pub tag: u32,
    pub params: Vec<(u32, Bytes)>,
}

impl CryptoMessage {
    pub fn new(tag: u32) -> Self {
        Self {
            tag,
            params: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn with_param(mut self, tag: u32, value: impl Into<Bytes>) -> Self {
        self.params.push((tag, value.into()));
        self
    }

    pub fn get(&self, tag: u32) -> Option<&Bytes> {
        self.params
            .iter()
            .find(|(param_tag, _)| *param_tag == tag)
            .map(|(_, value)| value)
    }

    /// Checks the message against the crypto message bounds.
    ///
    /// 根据加密消息边界检查该消息。
    pub fn validate(&self, config: &CryptoConfig) -> Result<()> {
        if self.params.len() > config.crypto_max_params {
            warn!(
                tag = self.tag,
                params = self.params.len(),
                max = config.crypto_max_params,
                "Crypto message has too many parameters"
            );
            return Err(Error::LimitExceeded(LimitKind::CryptoParams));
        }
        if let Some((param_tag, value)) = self
            .params
            .iter()
            .find(|(_, value)| value.len() > config.crypto_parameter_max_length)
        {
            warn!(
                tag = self.tag,
                param_tag,
                len = value.len(),
                max = config.crypto_parameter_max_length,
                "Crypto message parameter too long"
            );
            return Err(Error::LimitExceeded(LimitKind::CryptoParameterLength));
        }
        Ok(())
    }
}

/// Holds the current ephemeral key and regenerates it once its lifetime has
/// elapsed.
///
/// 持有当前的临时密钥，并在其生命周期结束后重新生成。
#[derive(Debug)]
pub struct EphemeralKeySlot<K> {
    current: Option<(K, Instant)>,
    lifetime: Duration,
}

impl<K> EphemeralKeySlot<K> {
    pub fn new(config: &CryptoConfig) -> Self {
        Self {
            current: None,
            lifetime: config.ephemeral_key_lifetime,
        }
    }

    /// Returns the current key, generating a fresh one if there is none or it
    /// has expired.
    ///
    /// 返回当前密钥；若尚无密钥或已过期，则生成新密钥。
    pub fn get_or_rotate(&mut self, now: Instant, generate: impl FnOnce() -> K) -> &K {
        let expired = self
            .current
            .as_ref()
            .is_none_or(|(_, created)| now.saturating_duration_since(*created) >= self.lifetime);
        if expired {
            self.current = None;
        }
        let (key, _) = self.current.get_or_insert_with(|| {
            debug!("Rotating ephemeral key");
            (generate(), now)
        });
        key
    }

    /// When the current key expires, if one exists.
    pub fn expires_at(&self) -> Option<Instant> {
        self.current
            .as_ref()
            .map(|(_, created)| *created + self.lifetime)
    }
}

/// Whether a source-address token issued at `issued` is still valid at `now`.
///
/// Tokens carry a wall-clock timestamp, so a token dated in the future is
/// rejected as well.
///
/// 在 `now` 时刻，`issued` 时签发的源地址令牌是否仍然有效。
/// 令牌携带的是墙上时钟时间戳，因此来自未来的令牌同样被拒绝。
pub fn source_address_token_valid(
    config: &CryptoConfig,
    issued: SystemTime,
    now: SystemTime,
) -> bool {
    match now.duration_since(issued) {
        Ok(age) => age < config.stk_expiry,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> CryptoConfig {
        CryptoConfig {
            crypto_max_params: 3,
            crypto_parameter_max_length: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_message_within_bounds() {
        let message = CryptoMessage::new(0x4f4c4843)
            .with_param(1, &b"abc"[..])
            .with_param(2, vec![0u8; 8]);
        assert!(message.validate(&create_test_config()).is_ok());
        assert_eq!(message.get(1), Some(&Bytes::from_static(b"abc")));
        assert_eq!(message.get(3), None);
    }

    #[test]
    fn test_too_many_params() {
        let message = (0..4).fold(CryptoMessage::new(1), |m, tag| m.with_param(tag, &b"x"[..]));
        assert_eq!(
            message.validate(&create_test_config()),
            Err(Error::LimitExceeded(LimitKind::CryptoParams))
        );
    }

    #[test]
    fn test_param_too_long() {
        let message = CryptoMessage::new(1).with_param(7, vec![0u8; 9]);
        assert_eq!(
            message.validate(&create_test_config()),
            Err(Error::LimitExceeded(LimitKind::CryptoParameterLength))
        );
    }

    #[test]
    fn test_default_bounds() {
        let config = CryptoConfig::default();
        let message = CryptoMessage::new(1).with_param(1, vec![0u8; 2000]);
        assert!(message.validate(&config).is_ok());
        let message = CryptoMessage::new(1).with_param(1, vec![0u8; 2001]);
        assert!(message.validate(&config).is_err());
    }

    #[test]
    fn test_ephemeral_key_rotates_after_lifetime() {
        let mut slot = EphemeralKeySlot::new(&CryptoConfig::default());
        let start = Instant::now();
        let mut generated = 0;
        let mut next_key = || {
            generated += 1;
            generated
        };

        assert_eq!(*slot.get_or_rotate(start, &mut next_key), 1);
        assert_eq!(
            *slot.get_or_rotate(start + Duration::from_secs(59), &mut next_key),
            1
        );
        assert_eq!(slot.expires_at(), Some(start + Duration::from_secs(60)));
        assert_eq!(
            *slot.get_or_rotate(start + Duration::from_secs(60), &mut next_key),
            2
        );
    }

    #[test]
    fn test_source_address_token_expiry() {
        let config = CryptoConfig::default();
        let issued = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let day = Duration::from_secs(24 * 60 * 60);

        assert!(source_address_token_valid(&config, issued, issued));
        assert!(source_address_token_valid(
            &config,
            issued,
            issued + day - Duration::from_secs(1)
        ));
        assert!(!source_address_token_valid(&config, issued, issued + day));
        assert!(!source_address_token_valid(
            &config,
            issued,
            issued - Duration::from_secs(1)
        ));
    }
}
